//! The per-cycle process callback.
//!
//! ```text
//!  audio in ──> port buffers ──┐
//!  synths ───> render buffers ─┼──> audio routes (fade, gain, meter) ──> buses ──> audio out
//!                              │
//!  midi in ──> port filter/bank ──> telemetry
//!                   │
//!                   └──> routes: classify ─> filter ─> bank ─> transpose ──> midi out / synth
//!  outbox ───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Runs on the audio thread with the engine state already locked. Nothing in
//! here allocates, blocks or logs.

use keystage_midi::{clamp_note, MidiEvent, MidiMessage, CC_SUSTAIN};

use crate::arena::Arena;
use crate::dispatch::{classify, Hold, Release, RouteAction};
use crate::handles::{PortId, SynthId};
use crate::mixer::{apply_gain, is_audible, meter_cycle, meter_silence, mix_route};
use crate::outbox::RouteOutbox;
use crate::panic::{closure_events, PanicState};
use crate::port::Port;
use crate::registry::{EngineState, SynthSlot};
use crate::route::{AudioSource, MidiDestination, MidiRoute, NoteOnRecord};
use crate::server::{PortKind, ProcessScope, ServerPortId};
use crate::synth::{StereoSide, SynthBridge};
use crate::telemetry::{MidiRxEvent, MidiRxSource};

/// Inputs to one cycle that live outside the locked state.
pub(crate) struct CycleInputs<'a> {
    pub bridge: Option<&'a dyn SynthBridge>,
    pub outbox: &'a RouteOutbox,
    pub transpose: i32,
    pub panic_requested: bool,
}

/// Run one process cycle.
pub(crate) fn process_cycle(
    state: &mut EngineState,
    inputs: &CycleInputs<'_>,
    scope: &mut dyn ProcessScope,
) {
    let n = scope.n_frames().min(state.max_block_size);
    state.panic = state.panic.observe(inputs.panic_requested);
    let panicking = state.panic.is_panicking();

    let EngineState {
        ports,
        midi_routes,
        audio_routes,
        synths,
        fade,
        panic,
        midi_tx,
        audio_tx,
        level_meter_cycles,
        ..
    } = state;

    // --- audio -------------------------------------------------------------

    read_audio_inputs(ports, scope, n);
    render_synths(synths, inputs.bridge, n);

    if !panicking {
        let any_solo = audio_routes.iter().any(|(_, r)| r.solo);
        for (id, route) in audio_routes.iter_mut() {
            let active = route.is_effectively_active(any_solo);
            let audible = is_audible(route, active, fade);
            let (true, Some(source), Some(dest)) = (audible, route.source, route.destination) else {
                if let Some(silence) = meter_silence(route, id) {
                    audio_tx.stash(silence);
                }
                continue;
            };
            match source {
                AudioSource::Port(src) => {
                    let Some((src_port, dest_port)) = ports.get_ref_mut(src, dest) else {
                        continue;
                    };
                    mix_route(
                        route,
                        active,
                        &src_port.buffer[..n],
                        &mut dest_port.buffer[..n],
                        fade,
                    );
                }
                AudioSource::Synth { synth, side } => {
                    let (Some(slot), Some(dest_port)) = (synths.get(synth), ports.get_mut(dest))
                    else {
                        continue;
                    };
                    let src = match side {
                        StereoSide::Left => &slot.left[..n],
                        StereoSide::Right => &slot.right[..n],
                    };
                    mix_route(route, active, src, &mut dest_port.buffer[..n], fade);
                }
            }
            if let Some(level) = meter_cycle(route, id, *level_meter_cycles) {
                audio_tx.stash(level);
            }
        }
    }

    write_audio_outputs(ports, scope, n);

    // --- midi --------------------------------------------------------------

    for (_, port) in ports.iter() {
        if port.kind == PortKind::MidiOut {
            scope.clear_midi_out(port.server_port);
        }
    }

    if *panic == PanicState::Entering {
        send_closures(ports, synths, inputs.bridge, scope);
        for route in midi_routes.values_mut() {
            route.clear_held();
        }
        *panic = panic.closures_sent();
    }

    for (id, port) in ports.iter_mut() {
        if port.kind != PortKind::MidiIn {
            continue;
        }
        port.receive(scope.midi_in(port.server_port));
        for event in port.rx_events.iter().filter(|e| !e.is_system()) {
            midi_tx.stash(MidiRxEvent {
                source: MidiRxSource::Port(id),
                event: *event,
            });
        }
    }

    let ports = &*ports;
    let synths = &*synths;
    let any_solo = midi_routes.iter().any(|(_, r)| r.solo);

    if !panicking {
        for (port_id, port) in ports.iter() {
            if port.kind != PortKind::MidiIn {
                continue;
            }
            for event in &port.rx_events {
                for (route_id, route) in midi_routes.iter_mut() {
                    if route.source != Some(port_id) {
                        continue;
                    }
                    let active = route.is_effectively_active(any_solo);
                    let destination = route.destination;
                    route_event(route, event, active, inputs.transpose, |out| {
                        let Some(dest) = destination else {
                            return;
                        };
                        deliver(dest, &out, ports, synths, inputs.bridge, scope);
                        midi_tx.stash(MidiRxEvent {
                            source: MidiRxSource::Route(route_id),
                            event: out,
                        });
                    });
                }
            }
        }
    }

    for (route_id, route) in midi_routes.iter() {
        let open = !panicking && route.is_effectively_active(any_solo);
        let destination = route.destination;
        inputs.outbox.drain(route_id, |event| {
            let (true, Some(dest)) = (open, destination) else {
                return;
            };
            deliver(dest, &event, ports, synths, inputs.bridge, scope);
            midi_tx.stash(MidiRxEvent {
                source: MidiRxSource::Route(route_id),
                event,
            });
        });
    }

    midi_tx.commit();
    audio_tx.commit();
}

fn read_audio_inputs(ports: &mut Arena<PortId, Port>, scope: &dyn ProcessScope, n: usize) {
    for port in ports.values_mut() {
        match port.kind {
            PortKind::AudioIn => {
                let buffer = &mut port.buffer[..n];
                match scope.audio_in(port.server_port) {
                    Some(input) => {
                        let m = n.min(input.len());
                        buffer[..m].copy_from_slice(&input[..m]);
                        buffer[m..].fill(0.0);
                    }
                    None => buffer.fill(0.0),
                }
                apply_gain(buffer, port.gain);
            }
            PortKind::AudioOut => port.buffer[..n].fill(0.0),
            PortKind::MidiIn | PortKind::MidiOut => {}
        }
    }
}

fn render_synths(synths: &mut Arena<SynthId, SynthSlot>, bridge: Option<&dyn SynthBridge>, n: usize) {
    for slot in synths.values_mut() {
        let left = &mut slot.left[..n];
        let right = &mut slot.right[..n];
        let written = match bridge {
            Some(bridge) => bridge.render_block(slot.handle, left, right).min(n),
            None => 0,
        };
        left[written..].fill(0.0);
        right[written..].fill(0.0);
    }
}

fn write_audio_outputs(ports: &mut Arena<PortId, Port>, scope: &mut dyn ProcessScope, n: usize) {
    for port in ports.values_mut() {
        if port.kind != PortKind::AudioOut {
            continue;
        }
        let buffer = &mut port.buffer[..n];
        apply_gain(buffer, port.gain);
        if let Some(out) = scope.audio_out(port.server_port) {
            let m = n.min(out.len());
            out[..m].copy_from_slice(&buffer[..m]);
        }
    }
}

/// One closure set per channel on every MIDI output, and on channel 0 of
/// every synth.
fn send_closures(
    ports: &Arena<PortId, Port>,
    synths: &Arena<SynthId, SynthSlot>,
    bridge: Option<&dyn SynthBridge>,
    scope: &mut dyn ProcessScope,
) {
    for (_, port) in ports.iter() {
        if port.kind != PortKind::MidiOut {
            continue;
        }
        for channel in 0..16 {
            for event in closure_events(channel) {
                scope.write_midi(port.server_port, event.into());
            }
        }
    }
    if let Some(bridge) = bridge {
        for (_, slot) in synths.iter() {
            for event in closure_events(0) {
                bridge.process_event(slot.handle, &event);
            }
        }
    }
}

fn write_port_event(scope: &mut dyn ProcessScope, port: ServerPortId, event: &MidiEvent) -> bool {
    if let Some(bank) = event.bank_select_events() {
        for cc in bank {
            scope.write_midi(port, cc.into());
        }
    }
    scope.write_midi(port, (*event).into())
}

/// Write an event to a route destination. A missing port or synth skips the
/// write.
fn deliver(
    dest: MidiDestination,
    event: &MidiEvent,
    ports: &Arena<PortId, Port>,
    synths: &Arena<SynthId, SynthSlot>,
    bridge: Option<&dyn SynthBridge>,
    scope: &mut dyn ProcessScope,
) -> bool {
    match dest {
        MidiDestination::Port(id) => match ports.get(id) {
            Some(port) => write_port_event(scope, port.server_port, event),
            None => false,
        },
        MidiDestination::Synth(id) => match (synths.get(id), bridge) {
            (Some(slot), Some(bridge)) => bridge.process_event(slot.handle, &event.with_channel(0)),
            _ => false,
        },
    }
}

/// Apply one route to one event, handing each resulting event to `emit`.
///
/// Releases bypass the route filter so that whatever the route sent earlier
/// is always closed, even after the filter or activity changed.
pub(crate) fn route_event(
    route: &mut MidiRoute,
    event: &MidiEvent,
    active: bool,
    transpose: i32,
    mut emit: impl FnMut(MidiEvent),
) {
    let ch = (event.channel & 0x0F) as usize;

    match classify(event, active) {
        RouteAction::Skip => {}

        RouteAction::Release(Release::Note) => {
            let Some(note) = event.note() else {
                return;
            };
            let velocity = event.velocity().unwrap_or(0);
            let mut i = 0;
            while i < route.notes.count() {
                let record = *route.notes.at(i);
                if record.source_note == note && record.source_channel == event.channel {
                    route.notes.remove(i);
                    let mut off =
                        MidiEvent::note_off(event.frame_offset, record.channel, record.note, velocity);
                    route.bank.process(&mut off);
                    emit(off);
                } else {
                    i += 1;
                }
            }
        }

        RouteAction::Release(Release::Sustain) => {
            // Half-pedal values still release fully.
            if let Some(out_channel) = route.sustain[ch].take() {
                let mut off =
                    MidiEvent::control_change(event.frame_offset, out_channel, CC_SUSTAIN, 0);
                route.bank.process(&mut off);
                emit(off);
            }
        }

        RouteAction::Release(Release::Pitchbend) => {
            if let Some(out_channel) = route.pitchbend[ch].take() {
                let mut center = event.with_channel(out_channel);
                route.bank.process(&mut center);
                emit(center);
            }
        }

        RouteAction::Forward(hold) => {
            if !route.filter.pass_filter(event) {
                return;
            }
            let mut out = route.filter.modify(event);

            // Only bank selects this route forwarded may annotate its program
            // changes, so the port's annotation is replaced.
            route.bank.process(&mut out);
            if out.is_bank_select() {
                return;
            }

            match hold {
                Hold::Note => {
                    let applied = if route.filter.ignore_global_transpose {
                        0
                    } else {
                        transpose
                    };
                    let MidiMessage::NoteOn { note, .. } = &mut out.msg else {
                        return;
                    };
                    let sounding = clamp_note(*note, applied);
                    *note = sounding;
                    let record = NoteOnRecord {
                        source_note: event.note().unwrap_or(sounding),
                        source_channel: event.channel,
                        note: sounding,
                        channel: out.channel,
                        transpose: applied,
                    };
                    if !route.notes.add(record) {
                        return;
                    }
                }
                Hold::Sustain => route.sustain[ch] = Some(out.channel),
                Hold::Pitchbend => route.pitchbend[ch] = Some(out.channel),
                Hold::None => {}
            }
            emit(out);
        }
    }
}
