//! Events captured on the audio thread for control-thread observers.

use keystage_midi::MidiEvent;

use crate::handles::{AudioRouteId, MidiRouteId, PortId};

/// Where a received MIDI event was observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MidiRxSource {
    /// After the port filter, before any route.
    Port(PortId),
    /// As forwarded by a route.
    Route(MidiRouteId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiRxEvent {
    pub source: MidiRxSource,
    pub event: MidiEvent,
}

/// Average absolute level of one audio route over a metering window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioRxEvent {
    pub route: AudioRouteId,
    pub level: f32,
}

// Ring buffer slots are pre-filled with defaults.

impl Default for MidiRxEvent {
    fn default() -> Self {
        Self {
            source: MidiRxSource::Port(PortId::placeholder()),
            event: MidiEvent::note_off(0, 0, 0, 0),
        }
    }
}

impl Default for AudioRxEvent {
    fn default() -> Self {
        Self {
            route: AudioRouteId::placeholder(),
            level: 0.0,
        }
    }
}
