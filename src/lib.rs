//! # Keystage - Real-time MIDI/Audio Routing for Live Keyboard Rigs
//!
//! ## Architecture
//!
//! Keystage is an umbrella crate that coordinates:
//! - **keystage-midi** - MIDI events, filters and zones, bank select tracking
//! - **keystage-core** - Routing engine (ports, routes, per-cycle processing,
//!   panic, telemetry, indicators, offline server)
//! - **keystage-synth** - Embedded SoundFont synthesizer (feature `soundfont`)
//!
//! ## Quick Start
//!
//! ```
//! use keystage::prelude::*;
//!
//! let rig = Keystage::builder().timer(false).build()?;
//!
//! let keys = rig.add_midi_port("keys", PortDirection::Input)?;
//! let sampler = rig.add_midi_port("sampler", PortDirection::Output)?;
//! let route = rig.add_midi_route_between(keys, MidiDestination::Port(sampler))?;
//!
//! // Upper half of the keyboard, one octave down
//! let filter = MidiFilter::default().with_zone(MidiZone::range(60, 127).with_offset(-12));
//! rig.set_route_midi_filter(route, filter)?;
//! rig.set_midi_route_active(route, true)?;
//! # Ok::<(), keystage::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - `soundfont`
//! - `soundfont` - Embedded SoundFont synthesizer

/// Re-export of keystage-core for direct access
pub use keystage_core as core;

/// Re-export of keystage-midi for direct access
pub use keystage_midi as midi;

#[cfg(feature = "soundfont")]
pub use keystage_synth as synth;

// Engine
pub use keystage_core::{
    AudioRouteId, AudioRouteInfo, AudioRxEvent, AudioServer, AudioSource, Engine, EngineBuilder,
    EngineConfig, MidiDestination, MidiRouteId, MidiRouteInfo, MidiRxEvent, MidiRxSource,
    Notification, NotificationReceiver, OfflineCycle, OfflineServer, PanicState, PauseGuard,
    PortDirection, PortId, PortInfo, PortKind, ProcessScope, StereoSide, SynthBridge, SynthHandle,
    SynthId, TelemetryTimer,
};

// Indicators
pub use keystage_core::{HeldState, PortIndicators, RouteIndicator, RouteIndicators};

// MIDI
pub use keystage_midi::{MidiEvent, MidiFilter, MidiMessage, MidiZone, RawMidiEvent, VelocityMap};

#[cfg(feature = "soundfont")]
pub use keystage_synth::{PresetInfo, SoundFontBridge, SoundFontLibrary};

mod builder;
mod engine;
mod error;

pub use builder::KeystageBuilder;
pub use engine::Keystage;
pub use error::{Error, Result};

#[cfg(feature = "soundfont")]
pub use engine::SoundFontLayer;

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Keystage, KeystageBuilder};

    pub use crate::core::{
        AudioSource, MidiDestination, Notification, PortDirection, StereoSide,
    };

    pub use crate::midi::{MidiEvent, MidiFilter, MidiZone};

    #[cfg(feature = "soundfont")]
    pub use crate::SoundFontLayer;
}
