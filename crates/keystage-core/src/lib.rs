//! Real-time MIDI and audio routing engine.
//!
//! # Primary API
//!
//! - [`Engine`] / [`EngineBuilder`]: ports, routes, synth slots, panic, transpose
//! - [`Engine::process`]: the per-cycle entry point for the audio thread
//! - [`PauseGuard`]: scoped pause around structural changes
//! - [`TelemetryTimer`]: periodic telemetry drain and server housekeeping
//! - [`PortIndicators`] / [`RouteIndicators`]: sustain, pitchbend and level state
//!
//! # Collaborators
//!
//! - [`AudioServer`] / [`ProcessScope`]: the audio server the engine is a client of
//!   ([`OfflineServer`] runs without one)
//! - [`SynthBridge`]: an embedded synthesizer
//!
//! # Example
//!
//! ```
//! use keystage_core::{Engine, MidiDestination, OfflineServer, PortDirection};
//! use keystage_midi::MidiEvent;
//!
//! let server = OfflineServer::new("keystage", 48000);
//! let engine = Engine::builder().server(server.clone()).build()?;
//!
//! let input = engine.add_midi_port("in", PortDirection::Input)?;
//! let output = engine.add_midi_port("out", PortDirection::Output)?;
//! let route = engine.add_midi_route_between(input, MidiDestination::Port(output))?;
//! engine.set_midi_route_active(route, true)?;
//!
//! let mut cycle = server.cycle(256);
//! cycle.push_midi(engine.server_port(input)?, MidiEvent::note_on(0, 0, 60, 100));
//! assert!(engine.process(&mut cycle));
//! assert_eq!(cycle.midi_out_events(engine.server_port(output)?).len(), 1);
//! # Ok::<(), keystage_core::Error>(())
//! ```

#[macro_use]
mod macros;

pub mod error;
pub use error::{Error, Result};

mod arena;
mod callback;
mod dispatch;
mod mixer;
mod outbox;
mod registry;

mod config;
pub use config::{EngineConfig, NOTE_RECORDS_PER_ROUTE};

mod engine;
pub use engine::{Engine, EngineBuilder, PauseGuard};

mod handles;
pub use handles::{AudioRouteId, MidiRouteId, PortId, SynthId};

mod indicator;
pub use indicator::{HeldState, PortIndicators, RouteIndicator, RouteIndicators};

pub(crate) mod lockfree;
pub use lockfree::{AtomicCounter, AtomicFlag, AtomicSemitones};

pub use mixer::FadeTable;

mod notify;
pub use notify::{Notification, NotificationReceiver};

mod offline;
pub use offline::{OfflineCycle, OfflineServer};

mod panic;
pub use panic::{closure_events, PanicState};

mod port;
pub use port::PortInfo;

pub mod ringbuffer;
pub use ringbuffer::{stash_buffer, BlockingRingBuffer, StashConsumer, StashProducer};

mod route;
pub use route::{AudioRouteInfo, AudioSource, MidiDestination, MidiRouteInfo, NoteOnRecord};

mod server;
pub use server::{
    AudioServer, PortDirection, PortKind, ProcessScope, ServerCallbacks, ServerPortId,
};

mod slot_list;
pub use slot_list::SlotList;

mod synth;
pub use synth::{StereoSide, SynthBridge, SynthHandle};

mod telemetry;
pub use telemetry::{AudioRxEvent, MidiRxEvent, MidiRxSource};

mod timer;
pub use timer::TelemetryTimer;

pub use dispatch::is_sustain_down;
