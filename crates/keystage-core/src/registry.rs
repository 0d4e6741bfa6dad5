//! Ports, routes and synth slots owned by the engine.
//!
//! Everything here is mutated only while the process callback is paused.
//! Removing a port or synth leaves every route that referenced it with a
//! `None` endpoint; such routes skip their writes until retargeted.

use crate::arena::Arena;
use crate::config::EngineConfig;
use crate::handles::{AudioRouteId, MidiRouteId, PortId, SynthId};
use crate::mixer::FadeTable;
use crate::panic::PanicState;
use crate::port::Port;
use crate::ringbuffer::StashProducer;
use crate::route::{AudioRoute, AudioSource, MidiDestination, MidiRoute};
use crate::server::{PortKind, ServerPortId};
use crate::synth::SynthHandle;
use crate::telemetry::{AudioRxEvent, MidiRxEvent};
use crate::{Error, Result};

/// A synth program plus its pre-allocated render buffers.
#[derive(Debug)]
pub(crate) struct SynthSlot {
    pub handle: SynthHandle,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// State shared between the control thread and the process callback.
pub(crate) struct EngineState {
    pub ports: Arena<PortId, Port>,
    pub midi_routes: Arena<MidiRouteId, MidiRoute>,
    pub audio_routes: Arena<AudioRouteId, AudioRoute>,
    pub synths: Arena<SynthId, SynthSlot>,
    /// Desired connections between two ports of other clients.
    pub other_connections: Vec<(String, String)>,
    pub fade: FadeTable,
    pub panic: PanicState,
    pub midi_tx: StashProducer<MidiRxEvent>,
    pub audio_tx: StashProducer<AudioRxEvent>,
    pub max_block_size: usize,
    pub midi_events_per_port: usize,
    pub level_meter_cycles: u32,
}

impl EngineState {
    pub fn new(
        config: &EngineConfig,
        midi_tx: StashProducer<MidiRxEvent>,
        audio_tx: StashProducer<AudioRxEvent>,
    ) -> Self {
        Self {
            ports: Arena::new(),
            midi_routes: Arena::new(),
            audio_routes: Arena::new(),
            synths: Arena::new(),
            other_connections: Vec::new(),
            fade: FadeTable::new(config.fade_len()),
            panic: PanicState::Idle,
            midi_tx,
            audio_tx,
            max_block_size: config.max_block_size,
            midi_events_per_port: config.midi_events_per_port,
            level_meter_cycles: config.level_meter_cycles,
        }
    }

    // --- ports -------------------------------------------------------------

    pub fn add_port(&mut self, name: &str, kind: PortKind, server_port: ServerPortId) -> PortId {
        self.ports.insert(Port::new(
            name,
            kind,
            server_port,
            self.max_block_size,
            self.midi_events_per_port,
        ))
    }

    /// Remove a port and null every route endpoint that referenced it.
    pub fn remove_port(&mut self, id: PortId) -> Result<Port> {
        let port = self.ports.remove(id).ok_or(Error::PortNotFound)?;
        for route in self.midi_routes.values_mut() {
            if route.source == Some(id) {
                route.source = None;
            }
            if route.destination == Some(MidiDestination::Port(id)) {
                route.destination = None;
            }
        }
        for route in self.audio_routes.values_mut() {
            if route.source == Some(AudioSource::Port(id)) {
                route.source = None;
            }
            if route.destination == Some(id) {
                route.destination = None;
            }
        }
        Ok(port)
    }

    pub fn port(&self, id: PortId) -> Result<&Port> {
        self.ports.get(id).ok_or(Error::PortNotFound)
    }

    pub fn port_mut(&mut self, id: PortId) -> Result<&mut Port> {
        self.ports.get_mut(id).ok_or(Error::PortNotFound)
    }

    /// Look up a port and check its kind.
    pub fn port_of_kind(&mut self, id: PortId, expected: PortKind) -> Result<&mut Port> {
        let port = self.port_mut(id)?;
        if port.kind != expected {
            return Err(Error::WrongPortKind {
                expected,
                found: port.kind,
            });
        }
        Ok(port)
    }

    /// Check that `id` is an audio port (either direction).
    pub fn audio_port_mut(&mut self, id: PortId) -> Result<&mut Port> {
        let port = self.port_mut(id)?;
        if port.kind.is_midi() {
            return Err(Error::WrongPortKind {
                expected: PortKind::AudioOut,
                found: port.kind,
            });
        }
        Ok(port)
    }

    // --- synths ------------------------------------------------------------

    pub fn add_synth(&mut self, handle: SynthHandle) -> SynthId {
        self.synths.insert(SynthSlot {
            handle,
            left: vec![0.0; self.max_block_size],
            right: vec![0.0; self.max_block_size],
        })
    }

    /// Remove a synth slot and null every route endpoint that referenced it.
    pub fn remove_synth(&mut self, id: SynthId) -> Result<SynthSlot> {
        let slot = self.synths.remove(id).ok_or(Error::SynthNotFound)?;
        for route in self.midi_routes.values_mut() {
            if route.destination == Some(MidiDestination::Synth(id)) {
                route.destination = None;
            }
        }
        for route in self.audio_routes.values_mut() {
            if matches!(route.source, Some(AudioSource::Synth { synth, .. }) if synth == id) {
                route.source = None;
            }
        }
        Ok(slot)
    }

    // --- routes ------------------------------------------------------------

    pub fn check_midi_endpoints(
        &mut self,
        source: Option<PortId>,
        destination: Option<MidiDestination>,
    ) -> Result<()> {
        if let Some(src) = source {
            self.port_of_kind(src, PortKind::MidiIn)?;
        }
        match destination {
            Some(MidiDestination::Port(dst)) => {
                self.port_of_kind(dst, PortKind::MidiOut)?;
            }
            Some(MidiDestination::Synth(synth)) if !self.synths.contains(synth) => {
                return Err(Error::SynthNotFound);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn check_audio_endpoints(
        &mut self,
        source: Option<AudioSource>,
        destination: Option<PortId>,
    ) -> Result<()> {
        match source {
            Some(AudioSource::Port(src)) => {
                self.port_of_kind(src, PortKind::AudioIn)?;
            }
            Some(AudioSource::Synth { synth, .. }) if !self.synths.contains(synth) => {
                return Err(Error::SynthNotFound);
            }
            _ => {}
        }
        if let Some(dst) = destination {
            self.port_of_kind(dst, PortKind::AudioOut)?;
        }
        Ok(())
    }

    pub fn add_midi_route(
        &mut self,
        source: Option<PortId>,
        destination: Option<MidiDestination>,
    ) -> Result<MidiRouteId> {
        self.check_midi_endpoints(source, destination)?;
        Ok(self.midi_routes.insert(MidiRoute::new(source, destination)))
    }

    pub fn add_audio_route(
        &mut self,
        source: Option<AudioSource>,
        destination: Option<PortId>,
    ) -> Result<AudioRouteId> {
        self.check_audio_endpoints(source, destination)?;
        let fade_end = self.fade.end();
        Ok(self
            .audio_routes
            .insert(AudioRoute::new(source, destination, fade_end)))
    }

    pub fn midi_route_mut(&mut self, id: MidiRouteId) -> Result<&mut MidiRoute> {
        self.midi_routes.get_mut(id).ok_or(Error::MidiRouteNotFound)
    }

    pub fn audio_route_mut(&mut self, id: AudioRouteId) -> Result<&mut AudioRoute> {
        self.audio_routes
            .get_mut(id)
            .ok_or(Error::AudioRouteNotFound)
    }

    pub fn any_midi_solo(&self) -> bool {
        self.midi_routes.iter().any(|(_, r)| r.solo)
    }

    pub fn any_audio_solo(&self) -> bool {
        self.audio_routes.iter().any(|(_, r)| r.solo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ringbuffer::stash_buffer;
    use crate::synth::StereoSide;

    fn state() -> EngineState {
        let config = EngineConfig {
            max_block_size: 64,
            ..EngineConfig::default()
        };
        let (midi_tx, _) = stash_buffer(16);
        let (audio_tx, _) = stash_buffer(16);
        EngineState::new(&config, midi_tx, audio_tx)
    }

    #[test]
    fn test_remove_port_nulls_routes() {
        let mut s = state();
        let input = s.add_port("in", PortKind::MidiIn, ServerPortId(0));
        let output = s.add_port("out", PortKind::MidiOut, ServerPortId(1));
        let route = s
            .add_midi_route(Some(input), Some(MidiDestination::Port(output)))
            .unwrap();

        s.remove_port(output).unwrap();
        let r = s.midi_route_mut(route).unwrap();
        assert_eq!(r.source, Some(input));
        assert_eq!(r.destination, None);
        assert!(matches!(s.remove_port(output), Err(Error::PortNotFound)));
    }

    #[test]
    fn test_remove_synth_nulls_routes() {
        let mut s = state();
        let synth = s.add_synth(SynthHandle(7));
        assert_eq!(s.synths.get(synth).unwrap().left.len(), 64);
        let bus = s.add_port("bus", PortKind::AudioOut, ServerPortId(0));
        let midi = s
            .add_midi_route(None, Some(MidiDestination::Synth(synth)))
            .unwrap();
        let audio = s
            .add_audio_route(
                Some(AudioSource::Synth {
                    synth,
                    side: StereoSide::Left,
                }),
                Some(bus),
            )
            .unwrap();

        s.remove_synth(synth).unwrap();
        assert_eq!(s.midi_route_mut(midi).unwrap().destination, None);
        let a = s.audio_route_mut(audio).unwrap();
        assert_eq!(a.source, None);
        assert_eq!(a.destination, Some(bus));
    }

    #[test]
    fn test_route_endpoints_checked() {
        let mut s = state();
        let midi_in = s.add_port("in", PortKind::MidiIn, ServerPortId(0));
        let bus = s.add_port("bus", PortKind::AudioOut, ServerPortId(1));

        let err = s
            .add_midi_route(Some(bus), None)
            .expect_err("audio port as MIDI source");
        assert!(matches!(
            err,
            Error::WrongPortKind {
                expected: PortKind::MidiIn,
                found: PortKind::AudioOut
            }
        ));
        assert!(s
            .add_midi_route(Some(midi_in), Some(MidiDestination::Port(midi_in)))
            .is_err());
        assert!(s.add_audio_route(None, Some(bus)).is_ok());
    }

    #[test]
    fn test_new_audio_route_is_silent() {
        let mut s = state();
        let id = s.add_audio_route(None, None).unwrap();
        let end = s.fade.end();
        assert_eq!(s.audio_route_mut(id).unwrap().fade_pos, end);
    }

    #[test]
    fn test_solo_scan_per_kind() {
        let mut s = state();
        let m = s.add_midi_route(None, None).unwrap();
        s.add_audio_route(None, None).unwrap();
        s.midi_route_mut(m).unwrap().solo = true;
        assert!(s.any_midi_solo());
        assert!(!s.any_audio_solo());
    }
}
