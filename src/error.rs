//! Centralized error type for the keystage umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] keystage_core::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] keystage_midi::Error),

    #[cfg(feature = "soundfont")]
    #[error("Synth: {0}")]
    Synth(#[from] keystage_synth::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
