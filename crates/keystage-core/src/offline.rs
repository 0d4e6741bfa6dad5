//! In-memory audio server for running without audio hardware and for tests.
//!
//! [`OfflineServer`] implements [`AudioServer`]; each call to
//! [`OfflineServer::cycle`] produces an [`OfflineCycle`] with buffers for every
//! registered port, which is then driven through
//! [`Engine::process`](crate::Engine::process).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use keystage_midi::{MidiEvent, RawMidiEvent};
use parking_lot::Mutex;

use crate::server::{AudioServer, PortDirection, PortKind, ProcessScope, ServerCallbacks, ServerPortId};
use crate::{Error, Result};

/// MIDI events an offline output port accepts per cycle.
const MIDI_OUT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct OfflineInner {
    client_name: String,
    sample_rate: u32,
    active: bool,
    next_id: u32,
    ports: BTreeMap<ServerPortId, (String, PortKind)>,
    /// Ports of other clients, with their kind as seen by that client.
    remote: Vec<(String, PortKind)>,
    connections: Vec<(String, String)>,
    callbacks: Option<Arc<ServerCallbacks>>,
}

impl OfflineInner {
    fn full_name(&self, port: &str) -> String {
        format!("{}:{}", self.client_name, port)
    }

    fn port_exists(&self, full_name: &str) -> bool {
        self.remote.iter().any(|(n, _)| n == full_name)
            || self
                .ports
                .values()
                .any(|(n, _)| self.full_name(n) == full_name)
    }

    fn notify_registration(&self) {
        if let Some(cb) = &self.callbacks {
            cb.port_registration();
        }
    }

    fn notify_connect(&self) {
        if let Some(cb) = &self.callbacks {
            cb.port_connect();
        }
    }
}

/// In-memory [`AudioServer`]. Clones share state.
#[derive(Clone, Debug)]
pub struct OfflineServer {
    client_name: Arc<str>,
    inner: Arc<Mutex<OfflineInner>>,
}

impl OfflineServer {
    pub fn new(client_name: impl Into<String>, sample_rate: u32) -> Self {
        let client_name: String = client_name.into();
        Self {
            client_name: Arc::from(client_name.as_str()),
            inner: Arc::new(Mutex::new(OfflineInner {
                client_name,
                sample_rate,
                active: true,
                next_id: 0,
                ports: BTreeMap::new(),
                remote: Vec::new(),
                connections: Vec::new(),
                callbacks: None,
            })),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.inner.lock().active = active;
    }

    /// Simulate another client registering a port (e.g. `"keyboard:out"`).
    pub fn add_remote_port(&self, full_name: impl Into<String>, kind: PortKind) {
        let mut inner = self.inner.lock();
        inner.remote.push((full_name.into(), kind));
        inner.notify_registration();
    }

    /// Simulate another client's port going away. Its connections are dropped.
    pub fn remove_remote_port(&self, full_name: &str) {
        let mut inner = self.inner.lock();
        inner.remote.retain(|(n, _)| n != full_name);
        inner
            .connections
            .retain(|(s, d)| s != full_name && d != full_name);
        inner.notify_registration();
    }

    pub fn simulate_xrun(&self) {
        if let Some(cb) = &self.inner.lock().callbacks {
            cb.xrun();
        }
    }

    pub fn connections(&self) -> Vec<(String, String)> {
        self.inner.lock().connections.clone()
    }

    pub fn is_connected(&self, source: &str, destination: &str) -> bool {
        self.inner
            .lock()
            .connections
            .iter()
            .any(|(s, d)| s == source && d == destination)
    }

    pub fn port_count(&self) -> usize {
        self.inner.lock().ports.len()
    }

    /// Buffers for one process cycle of `n_frames` samples.
    pub fn cycle(&self, n_frames: usize) -> OfflineCycle {
        let inner = self.inner.lock();
        let mut cycle = OfflineCycle {
            n_frames,
            audio_in: HashMap::new(),
            audio_out: HashMap::new(),
            midi_in: HashMap::new(),
            midi_out: HashMap::new(),
        };
        for (&id, &(_, kind)) in &inner.ports {
            match kind {
                PortKind::AudioIn => {
                    cycle.audio_in.insert(id, vec![0.0; n_frames]);
                }
                PortKind::AudioOut => {
                    cycle.audio_out.insert(id, vec![0.0; n_frames]);
                }
                PortKind::MidiIn => {
                    cycle.midi_in.insert(id, Vec::new());
                }
                PortKind::MidiOut => {
                    cycle
                        .midi_out
                        .insert(id, Vec::with_capacity(MIDI_OUT_CAPACITY));
                }
            }
        }
        cycle
    }
}

impl AudioServer for OfflineServer {
    fn client_name(&self) -> &str {
        &self.client_name
    }

    fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    fn sample_rate(&self) -> u32 {
        self.inner.lock().sample_rate
    }

    fn register_port(&mut self, name: &str, kind: PortKind) -> Result<ServerPortId> {
        let mut inner = self.inner.lock();
        if !inner.active {
            return Err(Error::ClientInactive);
        }
        if name.is_empty() || inner.ports.values().any(|(n, _)| n == name) {
            return Err(Error::PortRegistration(name.to_string()));
        }
        let id = ServerPortId(inner.next_id);
        inner.next_id += 1;
        inner.ports.insert(id, (name.to_string(), kind));
        inner.notify_registration();
        Ok(id)
    }

    fn unregister_port(&mut self, port: ServerPortId) -> Result<()> {
        let mut inner = self.inner.lock();
        let (name, _) = inner.ports.remove(&port).ok_or(Error::PortNotFound)?;
        let full = inner.full_name(&name);
        inner.connections.retain(|(s, d)| *s != full && *d != full);
        inner.notify_registration();
        Ok(())
    }

    fn port_name(&self, port: ServerPortId) -> Option<String> {
        let inner = self.inner.lock();
        inner.ports.get(&port).map(|(n, _)| inner.full_name(n))
    }

    fn connect(&mut self, source: &str, destination: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.active {
            return Err(Error::ClientInactive);
        }
        for name in [source, destination] {
            if !inner.port_exists(name) {
                return Err(Error::Connection(format!("no such port '{}'", name)));
            }
        }
        let pair = (source.to_string(), destination.to_string());
        if !inner.connections.contains(&pair) {
            inner.connections.push(pair);
            inner.notify_connect();
        }
        Ok(())
    }

    fn disconnect(&mut self, source: &str, destination: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let before = inner.connections.len();
        inner
            .connections
            .retain(|(s, d)| !(s == source && d == destination));
        if inner.connections.len() == before {
            return Err(Error::Connection(format!(
                "'{}' is not connected to '{}'",
                source, destination
            )));
        }
        inner.notify_connect();
        Ok(())
    }

    fn remote_ports(&self, kind: PortKind) -> Vec<String> {
        let wanted = match (kind.is_midi(), kind.direction()) {
            (true, PortDirection::Input) => PortKind::MidiOut,
            (true, PortDirection::Output) => PortKind::MidiIn,
            (false, PortDirection::Input) => PortKind::AudioOut,
            (false, PortDirection::Output) => PortKind::AudioIn,
        };
        self.inner
            .lock()
            .remote
            .iter()
            .filter(|(_, k)| *k == wanted)
            .map(|(n, _)| n.clone())
            .collect()
    }

    fn set_callbacks(&mut self, callbacks: Arc<ServerCallbacks>) {
        self.inner.lock().callbacks = Some(callbacks);
    }
}

/// Buffers for one offline process cycle.
#[derive(Debug)]
pub struct OfflineCycle {
    n_frames: usize,
    audio_in: HashMap<ServerPortId, Vec<f32>>,
    audio_out: HashMap<ServerPortId, Vec<f32>>,
    midi_in: HashMap<ServerPortId, Vec<RawMidiEvent>>,
    midi_out: HashMap<ServerPortId, Vec<RawMidiEvent>>,
}

impl OfflineCycle {
    /// Queue an incoming event on a MIDI input port.
    pub fn push_midi(&mut self, port: ServerPortId, event: MidiEvent) {
        if let Some(buf) = self.midi_in.get_mut(&port) {
            buf.push(event.into());
        }
    }

    pub fn push_raw_midi(&mut self, port: ServerPortId, event: RawMidiEvent) {
        if let Some(buf) = self.midi_in.get_mut(&port) {
            buf.push(event);
        }
    }

    /// Fill an audio input port's buffer (shorter slices leave the tail silent).
    pub fn set_audio_in(&mut self, port: ServerPortId, samples: &[f32]) {
        if let Some(buf) = self.audio_in.get_mut(&port) {
            let n = samples.len().min(buf.len());
            buf[..n].copy_from_slice(&samples[..n]);
        }
    }

    pub fn audio_out_buffer(&self, port: ServerPortId) -> &[f32] {
        self.audio_out.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn midi_out_raw(&self, port: ServerPortId) -> &[RawMidiEvent] {
        self.midi_out.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parsed output events for a MIDI output port.
    pub fn midi_out_events(&self, port: ServerPortId) -> Vec<MidiEvent> {
        self.midi_out_raw(port)
            .iter()
            .filter_map(|raw| raw.to_midi_event().ok())
            .collect()
    }
}

impl ProcessScope for OfflineCycle {
    fn n_frames(&self) -> usize {
        self.n_frames
    }

    fn audio_in(&self, port: ServerPortId) -> Option<&[f32]> {
        self.audio_in.get(&port).map(Vec::as_slice)
    }

    fn audio_out(&mut self, port: ServerPortId) -> Option<&mut [f32]> {
        self.audio_out.get_mut(&port).map(Vec::as_mut_slice)
    }

    fn midi_in(&self, port: ServerPortId) -> &[RawMidiEvent] {
        self.midi_in.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }

    fn clear_midi_out(&mut self, port: ServerPortId) {
        if let Some(buf) = self.midi_out.get_mut(&port) {
            buf.clear();
        }
    }

    fn write_midi(&mut self, port: ServerPortId, event: RawMidiEvent) -> bool {
        match self.midi_out.get_mut(&port) {
            Some(buf) if buf.len() < MIDI_OUT_CAPACITY => {
                buf.push(event);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_name() {
        let mut server = OfflineServer::new("ks", 48000);
        let id = server.register_port("midi_in", PortKind::MidiIn).unwrap();
        assert_eq!(server.port_name(id).as_deref(), Some("ks:midi_in"));
        assert!(server.register_port("midi_in", PortKind::MidiIn).is_err());
        server.unregister_port(id).unwrap();
        assert_eq!(server.port_count(), 0);
    }

    #[test]
    fn test_inactive_client() {
        let mut server = OfflineServer::new("ks", 48000);
        server.set_active(false);
        assert!(matches!(
            server.register_port("x", PortKind::AudioOut),
            Err(Error::ClientInactive)
        ));
    }

    #[test]
    fn test_connect_requires_existing_ports() {
        let mut server = OfflineServer::new("ks", 48000);
        server.register_port("in", PortKind::MidiIn).unwrap();
        assert!(server.connect("keyboard:out", "ks:in").is_err());

        server.add_remote_port("keyboard:out", PortKind::MidiOut);
        server.connect("keyboard:out", "ks:in").unwrap();
        assert!(server.is_connected("keyboard:out", "ks:in"));
        assert_eq!(server.remote_ports(PortKind::MidiIn), vec!["keyboard:out"]);

        server.remove_remote_port("keyboard:out");
        assert!(server.connections().is_empty());
    }

    #[test]
    fn test_callbacks_fire() {
        let mut server = OfflineServer::new("ks", 48000);
        let callbacks = Arc::new(ServerCallbacks::new());
        server.set_callbacks(Arc::clone(&callbacks));
        server.register_port("out", PortKind::AudioOut).unwrap();
        server.simulate_xrun();
        assert!(callbacks.take_ports_changed());
        assert_eq!(callbacks.take_xruns(), 1);
    }

    #[test]
    fn test_cycle_buffers() {
        let mut server = OfflineServer::new("ks", 48000);
        let ain = server.register_port("ain", PortKind::AudioIn).unwrap();
        let aout = server.register_port("aout", PortKind::AudioOut).unwrap();
        let mout = server.register_port("mout", PortKind::MidiOut).unwrap();

        let mut cycle = server.cycle(4);
        cycle.set_audio_in(ain, &[1.0, 2.0]);
        assert_eq!(cycle.audio_in(ain), Some(&[1.0, 2.0, 0.0, 0.0][..]));
        assert_eq!(cycle.audio_out_buffer(aout).len(), 4);

        assert!(cycle.write_midi(mout, MidiEvent::note_on(0, 0, 60, 1).into()));
        assert_eq!(cycle.midi_out_events(mout).len(), 1);
        cycle.clear_midi_out(mout);
        assert!(cycle.midi_out_raw(mout).is_empty());
    }
}
