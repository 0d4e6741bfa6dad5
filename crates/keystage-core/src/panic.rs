//! Engine-wide panic state machine.
//!
//! ```text
//!            request              closures sent
//!   Idle ─────────────> Entering ──────────────> Active
//!    ▲                  (one cycle)                │
//!    └─────────────────────────────────────────────┘
//!                       request cleared
//! ```
//!
//! The control thread only sets the request flag. The audio thread observes it
//! at the start of each cycle, so a panic takes effect on the next cycle.

use keystage_midi::{MidiEvent, CC_ALL_NOTES_OFF, CC_SUSTAIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanicState {
    #[default]
    Idle,
    /// Closure events go out this cycle.
    Entering,
    /// Routing suppressed until the request clears.
    Active,
}

impl PanicState {
    /// State for a new cycle given the current request.
    pub fn observe(self, requested: bool) -> Self {
        match (self, requested) {
            (PanicState::Idle, true) => PanicState::Entering,
            (PanicState::Active, false) => PanicState::Idle,
            (state, _) => state,
        }
    }

    /// Called once closures have been emitted.
    pub fn closures_sent(self) -> Self {
        match self {
            PanicState::Entering => PanicState::Active,
            state => state,
        }
    }

    #[inline]
    pub fn is_panicking(&self) -> bool {
        !matches!(self, PanicState::Idle)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            PanicState::Idle => 0,
            PanicState::Entering => 1,
            PanicState::Active => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PanicState::Entering,
            2 => PanicState::Active,
            _ => PanicState::Idle,
        }
    }
}

/// All-notes-off, sustain-off and pitchbend-center for one channel.
pub fn closure_events(channel: u8) -> [MidiEvent; 3] {
    [
        MidiEvent::control_change(0, channel, CC_ALL_NOTES_OFF, 0),
        MidiEvent::control_change(0, channel, CC_SUSTAIN, 0),
        MidiEvent::pitch_bend(0, channel, 0),
    ]
}
