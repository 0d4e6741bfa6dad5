//! Outbound notifications for control-side listeners.

use std::sync::Arc;
use std::time::Duration;

use crate::ringbuffer::BlockingRingBuffer;

/// Something a listener may want to react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A user-facing message (also logged).
    Print(String),
    /// The server reported one or more xruns since the last timer tick.
    Xrun,
    /// Ports were registered or unregistered on the server.
    PortsChanged,
    /// This many MIDI telemetry events are waiting in
    /// [`Engine::take_midi_rx_events`](crate::Engine::take_midi_rx_events).
    MidiRxAvailable(usize),
    /// This many audio level events are waiting in
    /// [`Engine::take_audio_rx_events`](crate::Engine::take_audio_rx_events).
    AudioRxAvailable(usize),
}

/// Receiving end of the engine's notification channel.
///
/// Clones read from the same queue; each notification is delivered once.
#[derive(Clone)]
pub struct NotificationReceiver {
    buffer: Arc<BlockingRingBuffer<Notification>>,
}

impl NotificationReceiver {
    pub(crate) fn new(buffer: Arc<BlockingRingBuffer<Notification>>) -> Self {
        Self { buffer }
    }

    /// Block until a notification arrives.
    pub fn read(&self) -> Notification {
        self.buffer.read()
    }

    pub fn read_timeout(&self, timeout: Duration) -> Option<Notification> {
        self.buffer.read_timeout(timeout)
    }

    pub fn try_read(&self) -> Option<Notification> {
        self.buffer.try_read()
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<Notification> {
        std::iter::from_fn(|| self.buffer.try_read()).collect()
    }

    pub fn available(&self) -> usize {
        self.buffer.available_to_read()
    }
}

impl std::fmt::Debug for NotificationReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationReceiver")
            .field("available", &self.available())
            .finish()
    }
}
