//! Sustain, pitchbend, activity and level indicators fed from telemetry.
//!
//! Runs on the control thread. Feed it whatever
//! [`Engine::take_midi_rx_events`](crate::Engine::take_midi_rx_events) and
//! [`Engine::take_audio_rx_events`](crate::Engine::take_audio_rx_events)
//! return.

use std::collections::HashMap;

use keystage_midi::{MidiEvent, MidiMessage, CC_SUSTAIN};

use crate::dispatch::is_sustain_down;
use crate::handles::{AudioRouteId, MidiRouteId, PortId};
use crate::telemetry::{AudioRxEvent, MidiRxEvent, MidiRxSource};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeldState {
    pub sustain: bool,
    pub pitchbend: bool,
}

impl HeldState {
    /// Apply one event. Returns the (sustain, pitchbend) changes, if any.
    fn update(&mut self, event: &MidiEvent) -> (Option<bool>, Option<bool>) {
        match event.msg {
            MidiMessage::ControlChange {
                control: CC_SUSTAIN,
                value,
            } => {
                let down = is_sustain_down(value);
                let changed = (self.sustain != down).then_some(down);
                self.sustain = down;
                (changed, None)
            }
            MidiMessage::PitchBend { value } => {
                let bent = value != 0;
                let changed = (self.pitchbend != bent).then_some(bent);
                self.pitchbend = bent;
                (None, changed)
            }
            _ => (None, None),
        }
    }
}

/// Whether any input port currently has sustain down or a non-zero bend.
#[derive(Debug, Default)]
pub struct PortIndicators {
    ports: HashMap<PortId, HeldState>,
    sustain_count: usize,
    pitchbend_count: usize,
}

impl PortIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed telemetry. Route events are ignored.
    pub fn midi_events(&mut self, events: &[MidiRxEvent]) {
        for rx in events {
            let MidiRxSource::Port(port) = rx.source else {
                continue;
            };
            let state = self.ports.entry(port).or_default();
            let (sustain, pitchbend) = state.update(&rx.event);
            if let Some(down) = sustain {
                adjust(&mut self.sustain_count, down);
            }
            if let Some(bent) = pitchbend {
                adjust(&mut self.pitchbend_count, bent);
            }
        }
    }

    pub fn is_sustain_down(&self) -> bool {
        self.sustain_count > 0
    }

    pub fn is_pitchbend_nonzero(&self) -> bool {
        self.pitchbend_count > 0
    }

    pub fn port_state(&self, port: PortId) -> HeldState {
        self.ports.get(&port).copied().unwrap_or_default()
    }

    /// Forget a removed port's contribution.
    pub fn port_removed(&mut self, port: PortId) {
        if let Some(state) = self.ports.remove(&port) {
            if state.sustain {
                adjust(&mut self.sustain_count, false);
            }
            if state.pitchbend {
                adjust(&mut self.pitchbend_count, false);
            }
        }
    }

    pub fn clear_sustain(&mut self) {
        self.ports.values_mut().for_each(|s| s.sustain = false);
        self.sustain_count = 0;
    }

    pub fn clear_pitchbend(&mut self) {
        self.ports.values_mut().for_each(|s| s.pitchbend = false);
        self.pitchbend_count = 0;
    }
}

fn adjust(count: &mut usize, up: bool) {
    if up {
        *count += 1;
    } else {
        *count = count.saturating_sub(1);
    }
}

/// Per-route indicator state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RouteIndicator {
    pub held: HeldState,
    /// Events forwarded since the last [`RouteIndicators::take_activity`].
    pub activity: usize,
}

/// Sustain, pitchbend and activity per MIDI route, level per audio route.
#[derive(Debug, Default)]
pub struct RouteIndicators {
    midi: HashMap<MidiRouteId, RouteIndicator>,
    levels: HashMap<AudioRouteId, f32>,
}

impl RouteIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed telemetry. Port events are ignored.
    pub fn midi_events(&mut self, events: &[MidiRxEvent]) {
        for rx in events {
            let MidiRxSource::Route(route) = rx.source else {
                continue;
            };
            let state = self.midi.entry(route).or_default();
            state.held.update(&rx.event);
            state.activity += 1;
        }
    }

    /// Keep the latest level per route.
    pub fn audio_events(&mut self, events: &[AudioRxEvent]) {
        for rx in events {
            self.levels.insert(rx.route, rx.level);
        }
    }

    pub fn route(&self, route: MidiRouteId) -> RouteIndicator {
        self.midi.get(&route).copied().unwrap_or_default()
    }

    /// Activity count for a route, resetting it.
    pub fn take_activity(&mut self, route: MidiRouteId) -> usize {
        self.midi
            .get_mut(&route)
            .map(|s| std::mem::take(&mut s.activity))
            .unwrap_or(0)
    }

    pub fn level(&self, route: AudioRouteId) -> Option<f32> {
        self.levels.get(&route).copied()
    }

    pub fn midi_route_removed(&mut self, route: MidiRouteId) {
        self.midi.remove(&route);
    }

    pub fn audio_route_removed(&mut self, route: AudioRouteId) {
        self.levels.remove(&route);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn port_ids(n: usize) -> Vec<PortId> {
        let mut arena: Arena<PortId, ()> = Arena::new();
        (0..n).map(|_| arena.insert(())).collect()
    }

    fn from_port(port: PortId, event: MidiEvent) -> MidiRxEvent {
        MidiRxEvent {
            source: MidiRxSource::Port(port),
            event,
        }
    }

    #[test]
    fn test_port_sustain_counts() {
        let ids = port_ids(2);
        let mut ind = PortIndicators::new();

        ind.midi_events(&[
            from_port(ids[0], MidiEvent::control_change(0, 0, 64, 127)),
            from_port(ids[1], MidiEvent::control_change(0, 0, 64, 127)),
        ]);
        assert!(ind.is_sustain_down());

        ind.midi_events(&[from_port(ids[0], MidiEvent::control_change(0, 0, 64, 0))]);
        assert!(ind.is_sustain_down());

        ind.port_removed(ids[1]);
        assert!(!ind.is_sustain_down());
    }

    #[test]
    fn test_repeated_values_do_not_double_count() {
        let ids = port_ids(1);
        let mut ind = PortIndicators::new();
        let bend = from_port(ids[0], MidiEvent::pitch_bend(0, 0, 500));
        ind.midi_events(&[bend, bend]);
        ind.midi_events(&[from_port(ids[0], MidiEvent::pitch_bend(0, 0, 0))]);
        assert!(!ind.is_pitchbend_nonzero());
    }

    #[test]
    fn test_clear() {
        let ids = port_ids(1);
        let mut ind = PortIndicators::new();
        ind.midi_events(&[
            from_port(ids[0], MidiEvent::control_change(0, 0, 64, 100)),
            from_port(ids[0], MidiEvent::pitch_bend(0, 0, -20)),
        ]);
        ind.clear_sustain();
        assert!(!ind.is_sustain_down());
        assert!(ind.is_pitchbend_nonzero());
        ind.clear_pitchbend();
        assert!(!ind.port_state(ids[0]).pitchbend);
    }

    #[test]
    fn test_route_activity_and_levels() {
        let mut routes: Arena<MidiRouteId, ()> = Arena::new();
        let mut audio: Arena<AudioRouteId, ()> = Arena::new();
        let r = routes.insert(());
        let a = audio.insert(());

        let mut ind = RouteIndicators::new();
        ind.midi_events(&[
            MidiRxEvent {
                source: MidiRxSource::Route(r),
                event: MidiEvent::control_change(0, 0, 64, 127),
            },
            MidiRxEvent {
                source: MidiRxSource::Route(r),
                event: MidiEvent::note_on(0, 0, 60, 1),
            },
        ]);
        assert!(ind.route(r).held.sustain);
        assert_eq!(ind.take_activity(r), 2);
        assert_eq!(ind.take_activity(r), 0);

        ind.audio_events(&[
            AudioRxEvent { route: a, level: 0.2 },
            AudioRxEvent { route: a, level: 0.4 },
        ]);
        assert_eq!(ind.level(a), Some(0.4));
        ind.audio_route_removed(a);
        assert_eq!(ind.level(a), None);
    }
}
