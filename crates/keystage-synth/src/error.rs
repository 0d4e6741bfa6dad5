//! Error types for keystage-synth.

use thiserror::Error;

/// Result type alias for keystage-synth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// SoundFont parsing or synthesizer creation failed.
    #[error("SoundFont error: {0}")]
    SoundFont(String),

    #[error("Synth program not found")]
    ProgramNotFound,
}
