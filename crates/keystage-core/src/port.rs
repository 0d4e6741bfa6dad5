//! Engine-side port state.

use keystage_midi::{BankSelectTracker, MidiEvent, MidiFilter, RawMidiEvent};

use crate::server::{PortKind, ServerPortId};

/// A port owned by the engine.
///
/// Audio ports carry a block-sized buffer: for inputs it holds this cycle's
/// samples, for outputs (buses) the mix before it is copied to the server.
/// MIDI inputs carry a filter, a bank-select tracker and scratch space for
/// this cycle's events. All buffers are sized at creation.
#[derive(Debug)]
pub(crate) struct Port {
    pub name: String,
    pub kind: PortKind,
    pub server_port: ServerPortId,
    /// Master gain (audio ports).
    pub gain: f32,
    /// Desired connections to ports of other clients, by full name.
    pub connections: Vec<String>,
    pub filter: MidiFilter,
    pub bank: BankSelectTracker,
    pub buffer: Vec<f32>,
    pub rx_events: Vec<MidiEvent>,
}

impl Port {
    pub fn new(
        name: &str,
        kind: PortKind,
        server_port: ServerPortId,
        max_block_size: usize,
        midi_capacity: usize,
    ) -> Self {
        let buffer = match kind {
            PortKind::AudioIn | PortKind::AudioOut => vec![0.0; max_block_size],
            _ => Vec::new(),
        };
        let rx_events = match kind {
            PortKind::MidiIn => Vec::with_capacity(midi_capacity),
            _ => Vec::new(),
        };
        Self {
            name: name.to_string(),
            kind,
            server_port,
            gain: 1.0,
            connections: Vec::new(),
            filter: MidiFilter::pass_all(),
            bank: BankSelectTracker::new(),
            buffer,
            rx_events,
        }
    }

    /// Parse, filter and bank-track this cycle's raw input into `rx_events`.
    /// Events beyond the pre-allocated capacity are dropped. RT-safe.
    pub fn receive(&mut self, raw: &[RawMidiEvent]) {
        self.rx_events.clear();
        let capacity = self.rx_events.capacity();
        for r in raw {
            if self.rx_events.len() >= capacity {
                break;
            }
            let Ok(event) = r.to_midi_event() else {
                continue;
            };
            if !self.filter.pass_filter(&event) {
                continue;
            }
            let mut event = self.filter.modify(&event);
            self.bank.process(&mut event);
            self.rx_events.push(event);
        }
    }

    pub fn info(&self) -> PortInfo {
        PortInfo {
            name: self.name.clone(),
            kind: self.kind,
            server_port: self.server_port,
            gain: self.gain,
            connections: self.connections.clone(),
        }
    }
}

/// Snapshot of a port's configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
    pub server_port: ServerPortId,
    pub gain: f32,
    pub connections: Vec<String>,
}
