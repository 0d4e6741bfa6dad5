//! Embedded SoundFont synthesizer for keystage.
//!
//! - **[`SoundFontBridge`]**: implements the core's [`SynthBridge`](keystage_core::SynthBridge)
//!   with one RustySynth synthesizer per program
//! - **[`SoundFontLibrary`]**: parses `.sf2` files once and shares them
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keystage_core::Engine;
//! use keystage_synth::SoundFontBridge;
//!
//! let bridge = Arc::new(SoundFontBridge::new(48000)?);
//! let engine = Engine::builder().synth_bridge(bridge.clone()).build()?;
//!
//! let piano = bridge.add_program("piano.sf2", 0, 0)?;
//! let slot = engine.add_synth(piano);
//! # let _ = slot;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub use error::{Error, Result};

mod bridge;
mod library;

pub use bridge::SoundFontBridge;
pub use library::{PresetInfo, SoundFontLibrary};
