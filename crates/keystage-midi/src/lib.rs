//! MIDI types for keystage.
//!
//! Pure, allocation-free building blocks shared by the engine and the synth
//! bridge:
//!
//! - **Events**: [`MidiEvent`] (parsed, `Copy`) and [`RawMidiEvent`] (wire bytes)
//! - **Filters**: [`MidiFilter`] with a single [`MidiZone`] (range, transpose,
//!   velocity curve and limits, pitchbend range, channel remap)
//! - **Bank select**: [`BankSelectTracker`] folds CC0/CC32 into program changes
//!
//! # Example
//!
//! ```
//! use keystage_midi::{MidiEvent, MidiFilter, MidiZone};
//!
//! let filter = MidiFilter::default().with_zone(MidiZone::range(36, 59).with_offset(12));
//! let event = MidiEvent::note_on(0, 0, 48, 100);
//! assert!(filter.pass_filter(&event));
//! assert_eq!(filter.modify(&event).note(), Some(60));
//! ```

pub mod error;
pub use error::{Error, Result};

mod bank;
mod event;
mod filter;
mod utils;
mod velocity;

pub use bank::BankSelectTracker;
pub use event::{
    BankSelect, MidiEvent, MidiEventBuilder, MidiMessage, RawMidiEvent, CC_ALL_NOTES_OFF,
    CC_ALL_SOUND_OFF, CC_BANK_SELECT_LSB, CC_BANK_SELECT_MSB, CC_SUSTAIN, SUSTAIN_THRESHOLD,
};
pub use filter::{CcSet, MidiFilter, MidiZone};
pub use utils::{
    clamp_note, offset_note, pitchbend_to_signed, signed_to_pitchbend, velocity_to_gain,
    NoteName,
};
pub use velocity::{VelocityMap, MAX_VELOCITY_POINTS};
