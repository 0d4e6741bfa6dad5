//! Per-route queues for events injected from the control thread.
//!
//! Each MIDI route gets a bounded channel when it is created. The control
//! thread queues with `try_send` (full queues drop); the audio thread drains
//! with `try_recv`. Routes are registered and unregistered only while the
//! engine is paused, so the audio thread never meets a write-locked shard.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use keystage_midi::MidiEvent;

use crate::handles::MidiRouteId;

struct RouteQueue {
    tx: Sender<MidiEvent>,
    rx: Receiver<MidiEvent>,
}

impl RouteQueue {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx }
    }
}

#[derive(Clone)]
pub(crate) struct RouteOutbox {
    queues: Arc<DashMap<MidiRouteId, Arc<RouteQueue>>>,
    capacity: usize,
}

impl RouteOutbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn register_route(&self, route: MidiRouteId) {
        let capacity = self.capacity;
        self.queues
            .entry(route)
            .or_insert_with(|| Arc::new(RouteQueue::new(capacity)));
    }

    pub fn unregister_route(&self, route: MidiRouteId) {
        self.queues.remove(&route);
    }

    /// Queue events for `route`. Returns how many were accepted, or `None`
    /// if the route is not registered.
    pub fn queue(&self, route: MidiRouteId, events: &[MidiEvent]) -> Option<usize> {
        let queue = self.queues.get(&route)?;
        Some(
            events
                .iter()
                .take_while(|&&event| queue.tx.try_send(event).is_ok())
                .count(),
        )
    }

    /// Hand every pending event for `route` to `f`. RT-safe.
    pub fn drain(&self, route: MidiRouteId, mut f: impl FnMut(MidiEvent)) -> usize {
        let Some(queue) = self.queues.get(&route) else {
            return 0;
        };
        let mut count = 0;
        while let Ok(event) = queue.rx.try_recv() {
            f(event);
            count += 1;
        }
        count
    }
}

impl std::fmt::Debug for RouteOutbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteOutbox")
            .field("routes", &self.queues.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
