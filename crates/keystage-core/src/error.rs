//! Error types for keystage-core.

use thiserror::Error;

use crate::server::PortKind;

/// Error type for keystage-core operations.
///
/// Only returned from control-thread operations. The process callback never
/// fails: contention skips the cycle and exhaustion drops data.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Audio server client is not active")]
    ClientInactive,

    #[error("Failed to register port '{0}'")]
    PortRegistration(String),

    #[error("Port not found")]
    PortNotFound,

    #[error("MIDI route not found")]
    MidiRouteNotFound,

    #[error("Audio route not found")]
    AudioRouteNotFound,

    #[error("Synth not found")]
    SynthNotFound,

    #[error("Wrong port kind: expected {expected:?}, found {found:?}")]
    WrongPortKind { expected: PortKind, found: PortKind },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error(transparent)]
    Midi(#[from] keystage_midi::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
