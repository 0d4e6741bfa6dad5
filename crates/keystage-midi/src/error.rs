//! Error types for keystage-midi.

use thiserror::Error;

/// Errors produced while parsing or validating MIDI data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    Parse(&'static str),

    #[error("Invalid MIDI channel: {0} (expected 0-15)")]
    InvalidChannel(u8),

    #[error("Invalid zone: {0}")]
    InvalidZone(String),

    #[error("Invalid velocity map: {0}")]
    InvalidVelocityMap(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
