//! Audio server contract.
//!
//! The engine is a client of a real-time audio server. The control side
//! ([`AudioServer`]) registers ports and manages connections; the real-time
//! side ([`ProcessScope`]) hands out per-cycle buffers to
//! [`Engine::process`](crate::Engine::process).
//!
//! Server callbacks (xrun, port registration, connection changes) must only
//! touch [`ServerCallbacks`]; the telemetry timer turns the flags into
//! notifications on the control thread.

use std::sync::Arc;

use keystage_midi::RawMidiEvent;
use serde::{Deserialize, Serialize};

use crate::lockfree::{AtomicCounter, AtomicFlag};
use crate::Result;

/// Direction of a port, seen from the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// The four kinds of ports the engine owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    MidiIn,
    MidiOut,
    AudioIn,
    /// An output bus.
    AudioOut,
}

impl PortKind {
    #[inline]
    pub fn midi(direction: PortDirection) -> Self {
        match direction {
            PortDirection::Input => PortKind::MidiIn,
            PortDirection::Output => PortKind::MidiOut,
        }
    }

    #[inline]
    pub fn audio(direction: PortDirection) -> Self {
        match direction {
            PortDirection::Input => PortKind::AudioIn,
            PortDirection::Output => PortKind::AudioOut,
        }
    }

    #[inline]
    pub fn is_midi(&self) -> bool {
        matches!(self, PortKind::MidiIn | PortKind::MidiOut)
    }

    #[inline]
    pub fn direction(&self) -> PortDirection {
        match self {
            PortKind::MidiIn | PortKind::AudioIn => PortDirection::Input,
            PortKind::MidiOut | PortKind::AudioOut => PortDirection::Output,
        }
    }
}

/// Server-side port identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerPortId(pub u32);

/// Flags set from server callbacks. Callback-safe: atomics only.
#[derive(Debug, Default)]
pub struct ServerCallbacks {
    xruns: AtomicCounter,
    ports_changed: AtomicFlag,
    connections_changed: AtomicFlag,
}

impl ServerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn xrun(&self) {
        self.xruns.increment();
    }

    /// A port was registered or unregistered anywhere on the server.
    #[inline]
    pub fn port_registration(&self) {
        self.ports_changed.set(true);
    }

    /// A connection was made or broken anywhere on the server.
    #[inline]
    pub fn port_connect(&self) {
        self.connections_changed.set(true);
    }

    pub(crate) fn take_xruns(&self) -> usize {
        self.xruns.take()
    }

    pub(crate) fn take_ports_changed(&self) -> bool {
        self.ports_changed.take()
    }

    pub(crate) fn take_connections_changed(&self) -> bool {
        self.connections_changed.take()
    }
}

/// Control-thread side of the audio server.
pub trait AudioServer: Send {
    fn client_name(&self) -> &str;

    fn is_active(&self) -> bool;

    fn sample_rate(&self) -> u32;

    /// Register a port named `name` on this client.
    fn register_port(&mut self, name: &str, kind: PortKind) -> Result<ServerPortId>;

    fn unregister_port(&mut self, port: ServerPortId) -> Result<()>;

    /// Full `client:port` name.
    fn port_name(&self, port: ServerPortId) -> Option<String>;

    /// Connect two ports by full name.
    fn connect(&mut self, source: &str, destination: &str) -> Result<()>;

    fn disconnect(&mut self, source: &str, destination: &str) -> Result<()>;

    /// Ports owned by other clients that could be connected to a port of `kind`.
    fn remote_ports(&self, kind: PortKind) -> Vec<String>;

    /// Install the flags that server callbacks should set.
    fn set_callbacks(&mut self, callbacks: Arc<ServerCallbacks>);
}

/// Real-time side: the buffers for one process cycle.
///
/// Implementations must not allocate or block in any of these methods.
pub trait ProcessScope {
    fn n_frames(&self) -> usize;

    fn audio_in(&self, port: ServerPortId) -> Option<&[f32]>;

    fn audio_out(&mut self, port: ServerPortId) -> Option<&mut [f32]>;

    fn midi_in(&self, port: ServerPortId) -> &[RawMidiEvent];

    fn clear_midi_out(&mut self, port: ServerPortId);

    /// Queue an event on an output port. Returns false when the port's buffer
    /// is full or the port is unknown.
    fn write_midi(&mut self, port: ServerPortId, event: RawMidiEvent) -> bool;
}
