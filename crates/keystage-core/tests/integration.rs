//! Integration tests for keystage-core.
//!
//! These drive the engine through an [`OfflineServer`] cycle by cycle, the
//! way an audio server's process callback would.

use std::sync::{Arc, OnceLock, Weak};

use keystage_core::{
    AudioServer, AudioSource, Engine, MidiDestination, MidiRxSource, Notification, OfflineServer,
    PanicState, PortDirection, PortId, PortKind, ServerCallbacks, ServerPortId, StereoSide,
    SynthBridge, SynthHandle,
};
use keystage_midi::{MidiEvent, MidiFilter, MidiMessage, CC_ALL_NOTES_OFF, CC_SUSTAIN};
use parking_lot::Mutex;

/// Records every event and renders a constant level.
#[derive(Default)]
struct TestBridge {
    events: Mutex<Vec<(SynthHandle, MidiEvent)>>,
    level: f32,
}

impl TestBridge {
    fn with_level(level: f32) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    fn take(&self) -> Vec<(SynthHandle, MidiEvent)> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl SynthBridge for TestBridge {
    fn process_event(&self, handle: SynthHandle, event: &MidiEvent) -> bool {
        self.events.lock().push((handle, *event));
        true
    }

    fn render_block(&self, _handle: SynthHandle, left: &mut [f32], right: &mut [f32]) -> usize {
        left.fill(self.level);
        right.fill(self.level);
        left.len()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Engine with one MIDI input, one MIDI output and an active route between them.
struct MidiRig {
    server: OfflineServer,
    engine: Engine,
    input: PortId,
    output: PortId,
    route: keystage_core::MidiRouteId,
}

impl MidiRig {
    fn new() -> Self {
        init_tracing();
        let server = OfflineServer::new("keystage", 48000);
        let engine = Engine::builder().server(server.clone()).build().unwrap();
        let input = engine.add_midi_port("in", PortDirection::Input).unwrap();
        let output = engine.add_midi_port("out", PortDirection::Output).unwrap();
        let route = engine
            .add_midi_route_between(input, MidiDestination::Port(output))
            .unwrap();
        engine.set_midi_route_active(route, true).unwrap();
        Self {
            server,
            engine,
            input,
            output,
            route,
        }
    }

    /// Run one cycle with `events` on the input and return what came out.
    fn cycle(&self, events: &[MidiEvent]) -> Vec<MidiEvent> {
        let input = self.engine.server_port(self.input).unwrap();
        let output = self.engine.server_port(self.output).unwrap();
        let mut cycle = self.server.cycle(64);
        for &event in events {
            cycle.push_midi(input, event);
        }
        assert!(self.engine.process(&mut cycle));
        cycle.midi_out_events(output)
    }
}

// ---------------------------------------------------------------------------
// 1. Note pairing
// ---------------------------------------------------------------------------

/// A note-off matches the note-on's pitch even after the transpose changed.
#[test]
fn test_note_off_after_transpose_change() {
    let rig = MidiRig::new();
    rig.engine.set_global_transpose(12);

    let out = rig.cycle(&[MidiEvent::note_on(0, 0, 60, 100)]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].note(), Some(72));

    rig.engine.set_global_transpose(-3);
    let out = rig.cycle(&[MidiEvent::note_off(0, 0, 60, 0)]);
    assert_eq!(out.len(), 1);
    assert!(out[0].is_note_off());
    assert_eq!(out[0].note(), Some(72));

    let info = rig.engine.midi_route_info(rig.route).unwrap();
    assert_eq!(info.held_notes, 0);
}

/// A velocity-0 note-on releases like a note-off.
#[test]
fn test_zero_velocity_note_on_releases() {
    let rig = MidiRig::new();
    rig.cycle(&[MidiEvent::note_on(0, 3, 40, 90)]);
    let out = rig.cycle(&[MidiEvent::note_on(0, 3, 40, 0)]);
    assert_eq!(out.len(), 1);
    assert!(out[0].is_note_off());
    assert_eq!(out[0].channel, 3);
}

/// Releases pass even after the route was deactivated; new notes do not.
#[test]
fn test_inactive_route_still_releases() {
    let rig = MidiRig::new();
    rig.cycle(&[
        MidiEvent::note_on(0, 0, 60, 100),
        MidiEvent::control_change(0, 0, CC_SUSTAIN, 127),
        MidiEvent::pitch_bend(0, 0, 1000),
    ]);
    let info = rig.engine.midi_route_info(rig.route).unwrap();
    assert_eq!(info.held_notes, 1);
    assert!(info.sustain_held);
    assert!(info.pitchbend_held);

    rig.engine.set_midi_route_active(rig.route, false).unwrap();

    let out = rig.cycle(&[MidiEvent::note_on(0, 0, 64, 100)]);
    assert!(out.is_empty());

    let out = rig.cycle(&[
        MidiEvent::note_off(0, 0, 60, 0),
        MidiEvent::control_change(0, 0, CC_SUSTAIN, 0),
        MidiEvent::pitch_bend(0, 0, 0),
    ]);
    assert_eq!(out.len(), 3);
    assert!(out[0].is_note_off());
    assert_eq!(out[1].cc(), Some((CC_SUSTAIN, 0)));
    assert_eq!(out[2].msg, MidiMessage::PitchBend { value: 0 });

    let info = rig.engine.midi_route_info(rig.route).unwrap();
    assert_eq!(info.held_notes, 0);
    assert!(!info.sustain_held);
    assert!(!info.pitchbend_held);
}

/// Sustain-off with nothing held is dropped, as is an unmatched note-off.
#[test]
fn test_unheld_releases_dropped() {
    let rig = MidiRig::new();
    let out = rig.cycle(&[
        MidiEvent::control_change(0, 0, CC_SUSTAIN, 0),
        MidiEvent::note_off(0, 0, 60, 0),
        MidiEvent::pitch_bend(0, 0, 0),
    ]);
    assert!(out.is_empty());
}

/// After retargeting, held notes are released on the new destination.
#[test]
fn test_retarget_releases_on_new_destination() {
    let rig = MidiRig::new();
    let other = rig
        .engine
        .add_midi_port("out2", PortDirection::Output)
        .unwrap();
    rig.cycle(&[MidiEvent::note_on(0, 0, 60, 100)]);

    rig.engine
        .set_midi_route(rig.route, Some(rig.input), Some(MidiDestination::Port(other)))
        .unwrap();

    let input = rig.engine.server_port(rig.input).unwrap();
    let mut cycle = rig.server.cycle(64);
    cycle.push_midi(input, MidiEvent::note_off(0, 0, 60, 0));
    assert!(rig.engine.process(&mut cycle));

    let moved = cycle.midi_out_events(rig.engine.server_port(other).unwrap());
    assert_eq!(moved.len(), 1);
    assert!(moved[0].is_note_off());
    assert!(cycle
        .midi_out_events(rig.engine.server_port(rig.output).unwrap())
        .is_empty());
}

// ---------------------------------------------------------------------------
// 2. Filters and bank select
// ---------------------------------------------------------------------------

/// Bank select arrives as separate CCs, leaves as CC0, CC32, program change.
#[test]
fn test_bank_select_precedes_program_change() {
    let rig = MidiRig::new();
    let mut filter = MidiFilter::default().allow_cc(0).allow_cc(32);
    filter.pass_prog = true;
    rig.engine.set_route_midi_filter(rig.route, filter).unwrap();

    let out = rig.cycle(&[
        MidiEvent::control_change(0, 1, 0, 2),
        MidiEvent::control_change(0, 1, 32, 5),
        MidiEvent::program_change(0, 1, 17),
    ]);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].cc(), Some((0, 2)));
    assert_eq!(out[1].cc(), Some((32, 5)));
    assert_eq!(out[2].msg, MidiMessage::ProgramChange { program: 17 });
    assert!(out.iter().all(|e| e.channel == 1));
}

/// A route that blocks bank selects sends bare program changes, even though
/// the input port saw the whole bank select.
#[test]
fn test_blocked_bank_select_not_merged() {
    let rig = MidiRig::new();
    let mut filter = MidiFilter::default();
    filter.pass_prog = true;
    rig.engine.set_route_midi_filter(rig.route, filter).unwrap();

    let out = rig.cycle(&[
        MidiEvent::control_change(0, 0, 0, 1),
        MidiEvent::control_change(0, 0, 32, 3),
        MidiEvent::program_change(0, 0, 9),
    ]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].msg, MidiMessage::ProgramChange { program: 9 });
    assert_eq!(out[0].bank, None);

    let port_rx: Vec<_> = rig
        .engine
        .take_midi_rx_events()
        .into_iter()
        .filter(|rx| rx.source == MidiRxSource::Port(rig.input))
        .collect();
    assert!(port_rx.last().unwrap().event.bank.is_some());
}

/// A half-pedal release closes the pedal completely.
#[test]
fn test_sustain_release_is_zero() {
    let rig = MidiRig::new();
    rig.cycle(&[MidiEvent::control_change(0, 0, CC_SUSTAIN, 127)]);
    let out = rig.cycle(&[MidiEvent::control_change(0, 0, CC_SUSTAIN, 40)]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].cc(), Some((CC_SUSTAIN, 0)));
    assert!(!rig.engine.midi_route_info(rig.route).unwrap().sustain_held);
}

/// The default route filter blocks program changes and unlisted CCs.
#[test]
fn test_default_route_filter() {
    let rig = MidiRig::new();
    let out = rig.cycle(&[
        MidiEvent::program_change(0, 0, 3),
        MidiEvent::control_change(0, 0, 7, 100),
        MidiEvent::control_change(0, 0, CC_SUSTAIN, 127),
    ]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].cc(), Some((CC_SUSTAIN, 127)));
}

/// Port filters apply before any route sees the event.
#[test]
fn test_port_filter_channel() {
    let rig = MidiRig::new();
    rig.engine
        .set_port_filter(rig.input, MidiFilter::pass_all().with_in_channel(Some(2)))
        .unwrap();
    let out = rig.cycle(&[
        MidiEvent::note_on(0, 0, 60, 100),
        MidiEvent::note_on(0, 2, 62, 100),
    ]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].note(), Some(62));
}

// ---------------------------------------------------------------------------
// 3. Mute, solo and the outbox
// ---------------------------------------------------------------------------

#[test]
fn test_mute_and_solo() {
    let rig = MidiRig::new();
    let second = rig
        .engine
        .add_midi_route_between(rig.input, MidiDestination::Port(rig.output))
        .unwrap();
    rig.engine.set_midi_route_active(second, true).unwrap();

    assert_eq!(rig.cycle(&[MidiEvent::note_on(0, 0, 60, 100)]).len(), 2);

    rig.engine.set_midi_route_solo(second, true).unwrap();
    assert_eq!(rig.cycle(&[MidiEvent::note_on(0, 0, 61, 100)]).len(), 1);

    rig.engine.set_midi_route_mute(second, true).unwrap();
    assert!(rig.cycle(&[MidiEvent::note_on(0, 0, 62, 100)]).is_empty());
}

/// Events queued from the control thread go out on the next cycle.
#[test]
fn test_outbox_delivery() {
    let rig = MidiRig::new();
    let queued = rig
        .engine
        .send_midi_events_on_route(rig.route, &[MidiEvent::control_change(0, 4, 7, 90)])
        .unwrap();
    assert_eq!(queued, 1);

    let out = rig.cycle(&[]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].cc(), Some((7, 90)));
    assert_eq!(out[0].channel, 4);
    assert!(rig.cycle(&[]).is_empty());

    rig.engine.remove_midi_route(rig.route).unwrap();
    assert!(rig
        .engine
        .send_midi_events_on_route(rig.route, &[MidiEvent::note_on(0, 0, 60, 1)])
        .is_err());
}

/// Adding and removing routes while the audio thread runs never blocks it,
/// and a route that stays in place gets everything queued on it.
#[test]
fn test_route_churn_while_processing() {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    let rig = MidiRig::new();
    let output = rig.engine.server_port(rig.output).unwrap();
    let done = AtomicBool::new(false);
    let delivered = AtomicUsize::new(0);

    std::thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                let mut cycle = rig.server.cycle(64);
                if rig.engine.process(&mut cycle) {
                    delivered.fetch_add(cycle.midi_out_events(output).len(), Ordering::AcqRel);
                }
            }
        });

        for value in 0..10 {
            let extra = rig.engine.add_midi_route().unwrap();
            rig.engine
                .send_midi_events_on_route(rig.route, &[MidiEvent::control_change(0, 0, 7, value)])
                .unwrap();
            for _ in 0..20 {
                let churn = rig.engine.add_midi_route().unwrap();
                rig.engine.remove_midi_route(churn).unwrap();
            }
            rig.engine.remove_midi_route(extra).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        while delivered.load(Ordering::Acquire) < 10 && Instant::now() < deadline {
            std::thread::yield_now();
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(delivered.load(Ordering::Acquire), 10);
    assert_eq!(rig.engine.midi_routes(), [rig.route]);
}

/// Queued events are dropped when the route is inactive at delivery time.
#[test]
fn test_outbox_inactive_route_drops() {
    let rig = MidiRig::new();
    rig.engine.set_midi_route_active(rig.route, false).unwrap();
    rig.engine
        .send_midi_events_on_route(rig.route, &[MidiEvent::note_on(0, 0, 60, 1)])
        .unwrap();
    assert!(rig.cycle(&[]).is_empty());

    rig.engine.set_midi_route_active(rig.route, true).unwrap();
    assert!(rig.cycle(&[]).is_empty());
}

// ---------------------------------------------------------------------------
// 4. Panic
// ---------------------------------------------------------------------------

#[test]
fn test_panic_closures_sent_once() {
    init_tracing();
    let bridge = Arc::new(TestBridge::default());
    let server = OfflineServer::new("keystage", 48000);
    let engine = Engine::builder()
        .server(server.clone())
        .synth_bridge(bridge.clone())
        .build()
        .unwrap();
    let input = engine.add_midi_port("in", PortDirection::Input).unwrap();
    let output = engine.add_midi_port("out", PortDirection::Output).unwrap();
    let synth = engine.add_synth(SynthHandle(7));
    for dest in [MidiDestination::Port(output), MidiDestination::Synth(synth)] {
        let route = engine.add_midi_route_between(input, dest).unwrap();
        engine.set_midi_route_active(route, true).unwrap();
    }

    let in_port = engine.server_port(input).unwrap();
    let out_port = engine.server_port(output).unwrap();

    engine.panic(true);
    let mut cycle = server.cycle(64);
    cycle.push_midi(in_port, MidiEvent::note_on(0, 0, 60, 100));
    assert!(engine.process(&mut cycle));

    let out = cycle.midi_out_events(out_port);
    assert_eq!(out.len(), 16 * 3);
    for channel in 0..16u8 {
        let per_channel: Vec<_> = out.iter().filter(|e| e.channel == channel).collect();
        assert_eq!(per_channel.len(), 3);
        assert_eq!(per_channel[0].cc(), Some((CC_ALL_NOTES_OFF, 0)));
    }
    assert!(out.iter().all(|e| !e.is_note_on()));

    let synth_events = bridge.take();
    assert_eq!(synth_events.len(), 3);
    assert!(synth_events
        .iter()
        .all(|(h, e)| *h == SynthHandle(7) && e.channel == 0));
    assert_eq!(engine.panic_state(), PanicState::Active);

    // Blocked until cleared, and closures do not repeat.
    let mut cycle = server.cycle(64);
    cycle.push_midi(in_port, MidiEvent::note_on(0, 0, 61, 100));
    assert!(engine.process(&mut cycle));
    assert!(cycle.midi_out_events(out_port).is_empty());
    assert!(bridge.take().is_empty());

    engine.panic(false);
    let mut cycle = server.cycle(64);
    cycle.push_midi(in_port, MidiEvent::note_on(0, 0, 62, 100));
    assert!(engine.process(&mut cycle));
    assert_eq!(engine.panic_state(), PanicState::Idle);
    let out = cycle.midi_out_events(out_port);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].note(), Some(62));

    let synth_events = bridge.take();
    assert_eq!(synth_events.len(), 1);
    assert_eq!(synth_events[0].1.note(), Some(62));
}

/// Panic clears held state, so a later note-off is not forwarded.
#[test]
fn test_panic_clears_held_notes() {
    let rig = MidiRig::new();
    rig.cycle(&[MidiEvent::note_on(0, 0, 60, 100)]);
    rig.engine.panic(true);
    rig.cycle(&[]);
    rig.engine.panic(false);
    assert!(rig.cycle(&[MidiEvent::note_off(0, 0, 60, 0)]).is_empty());
}

// ---------------------------------------------------------------------------
// 5. Audio
// ---------------------------------------------------------------------------

/// Activation ramps up without jumps and reaches the full level.
#[test]
fn test_audio_fade_in_is_continuous() {
    init_tracing();
    let server = OfflineServer::new("keystage", 48000);
    let engine = Engine::builder()
        .server(server.clone())
        .fade_secs(0.001)
        .build()
        .unwrap();
    let input = engine.add_audio_port("in", PortDirection::Input).unwrap();
    let bus = engine.add_audio_port("bus", PortDirection::Output).unwrap();
    let route = engine
        .add_audio_route_between(AudioSource::Port(input), bus)
        .unwrap();

    let in_port = engine.server_port(input).unwrap();
    let bus_port = engine.server_port(bus).unwrap();
    let step = 1.0 / (engine.config().fade_len() - 1) as f32;

    let run = |engine: &Engine| -> Vec<f32> {
        let mut cycle = server.cycle(32);
        cycle.set_audio_in(in_port, &[1.0; 32]);
        assert!(engine.process(&mut cycle));
        cycle.audio_out_buffer(bus_port).to_vec()
    };

    // Inactive routes are silent.
    assert!(run(&engine).iter().all(|&s| s == 0.0));

    engine.set_audio_route_active(route, true).unwrap();
    let mut samples = Vec::new();
    for _ in 0..4 {
        samples.extend(run(&engine));
    }
    for pair in samples.windows(2) {
        assert!((pair[1] - pair[0]).abs() <= step + 1e-6);
    }
    approx::assert_relative_eq!(*samples.last().unwrap(), 1.0);

    engine.set_audio_route_active(route, false).unwrap();
    let mut samples = Vec::new();
    for _ in 0..4 {
        samples.extend(run(&engine));
    }
    for pair in samples.windows(2) {
        assert!((pair[1] - pair[0]).abs() <= step + 1e-6);
    }
    assert_eq!(*samples.last().unwrap(), 0.0);
}

/// Synth output reaches the bus and level telemetry reports it.
#[test]
fn test_synth_audio_and_level_telemetry() {
    init_tracing();
    let bridge = Arc::new(TestBridge::with_level(0.5));
    let server = OfflineServer::new("keystage", 48000);
    let engine = Engine::builder()
        .server(server.clone())
        .synth_bridge(bridge)
        .fade_secs(0.001)
        .level_meter_cycles(2)
        .build()
        .unwrap();
    let bus = engine.add_audio_port("left", PortDirection::Output).unwrap();
    let synth = engine.add_synth(SynthHandle(1));
    let route = engine
        .add_audio_route_between(
            AudioSource::Synth {
                synth,
                side: StereoSide::Left,
            },
            bus,
        )
        .unwrap();
    engine.set_audio_route_active(route, true).unwrap();
    engine.set_audio_route_gain(route, 0.5).unwrap();

    let bus_port = engine.server_port(bus).unwrap();
    let mut last = Vec::new();
    for _ in 0..8 {
        let mut cycle = server.cycle(64);
        assert!(engine.process(&mut cycle));
        last = cycle.audio_out_buffer(bus_port).to_vec();
    }
    approx::assert_relative_eq!(last[63], 0.25);

    let levels = engine.take_audio_rx_events();
    assert_eq!(levels.len(), 4);
    assert!(levels.iter().all(|l| l.route == route));
    approx::assert_relative_eq!(levels[3].level, 0.25, epsilon = 1e-6);

    // Fade out: the meter ends on a single zero reading.
    engine.set_audio_route_active(route, false).unwrap();
    let fade_cycles = engine.config().fade_len() / 64 + 2;
    for _ in 0..fade_cycles {
        let mut cycle = server.cycle(64);
        assert!(engine.process(&mut cycle));
    }
    let levels = engine.take_audio_rx_events();
    assert_eq!(levels.last().map(|l| l.level), Some(0.0));
    assert_eq!(levels.iter().filter(|l| l.level == 0.0).count(), 1);

    for _ in 0..4 {
        let mut cycle = server.cycle(64);
        assert!(engine.process(&mut cycle));
    }
    assert!(engine.take_audio_rx_events().is_empty());
}

/// Any panic state silences the buses.
#[test]
fn test_panic_silences_audio() {
    init_tracing();
    let bridge = Arc::new(TestBridge::with_level(1.0));
    let server = OfflineServer::new("keystage", 48000);
    let engine = Engine::builder()
        .server(server.clone())
        .synth_bridge(bridge)
        .fade_secs(0.001)
        .build()
        .unwrap();
    let bus = engine.add_audio_port("bus", PortDirection::Output).unwrap();
    let synth = engine.add_synth(SynthHandle(1));
    let route = engine
        .add_audio_route_between(
            AudioSource::Synth {
                synth,
                side: StereoSide::Right,
            },
            bus,
        )
        .unwrap();
    engine.set_audio_route_active(route, true).unwrap();

    let bus_port = engine.server_port(bus).unwrap();
    engine.panic(true);
    for _ in 0..2 {
        let mut cycle = server.cycle(64);
        assert!(engine.process(&mut cycle));
        assert!(cycle.audio_out_buffer(bus_port).iter().all(|&s| s == 0.0));
    }
}

// ---------------------------------------------------------------------------
// 6. Structure and telemetry
// ---------------------------------------------------------------------------

#[test]
fn test_remove_port_nulls_route_endpoints() {
    let rig = MidiRig::new();
    rig.engine.remove_port(rig.output).unwrap();
    let info = rig.engine.midi_route_info(rig.route).unwrap();
    assert_eq!(info.source, Some(rig.input));
    assert_eq!(info.destination, None);

    rig.engine.remove_port(rig.input).unwrap();
    let info = rig.engine.midi_route_info(rig.route).unwrap();
    assert_eq!(info.source, None);
    assert!(rig.engine.port_info(rig.input).is_err());
    assert_eq!(rig.server.port_count(), 0);
}

#[test]
fn test_route_endpoint_kinds_checked() {
    let rig = MidiRig::new();
    assert!(rig
        .engine
        .add_midi_route_between(rig.output, MidiDestination::Port(rig.input))
        .is_err());
    assert!(rig
        .engine
        .add_audio_route_between(AudioSource::Port(rig.input), rig.output)
        .is_err());
}

#[test]
fn test_midi_telemetry_sources() {
    let rig = MidiRig::new();
    rig.cycle(&[MidiEvent::note_on(0, 0, 60, 100)]);

    let events = rig.engine.take_midi_rx_events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].source, MidiRxSource::Port(rig.input));
    assert_eq!(events[1].source, MidiRxSource::Route(rig.route));
    assert!(rig.engine.take_midi_rx_events().is_empty());
}

/// A pause held on one thread makes the audio thread skip its cycle.
#[test]
fn test_pause_skips_cycle_from_other_thread() {
    let rig = MidiRig::new();
    let pause = rig.engine.pause();
    std::thread::scope(|s| {
        s.spawn(|| {
            let mut cycle = rig.server.cycle(64);
            assert!(!rig.engine.process(&mut cycle));
        });
    });
    drop(pause);
    let mut cycle = rig.server.cycle(64);
    assert!(rig.engine.process(&mut cycle));
}

// ---------------------------------------------------------------------------
// 7. Connections and notifications
// ---------------------------------------------------------------------------

#[test]
fn test_connection_restored_when_remote_appears() {
    let rig = MidiRig::new();
    let notifications = rig.engine.notifications();
    rig.engine.on_timer();
    notifications.drain();

    assert!(rig.engine.add_port_connection(rig.input, "keyboard:out").is_err());
    assert_eq!(rig.engine.port_connections(rig.input).unwrap(), ["keyboard:out"]);

    rig.server.add_remote_port("keyboard:out", PortKind::MidiOut);
    assert_eq!(rig.engine.remote_ports(PortKind::MidiIn), ["keyboard:out"]);

    rig.engine.on_timer();
    assert!(rig.server.is_connected("keyboard:out", "keystage:in"));
    assert!(notifications.drain().contains(&Notification::PortsChanged));

    rig.engine.clear_port_connections(rig.input).unwrap();
    assert!(!rig.server.is_connected("keyboard:out", "keystage:in"));
}

#[test]
fn test_other_connections() {
    let rig = MidiRig::new();
    rig.server.add_remote_port("a:out", PortKind::AudioOut);
    rig.server.add_remote_port("b:in", PortKind::AudioIn);

    rig.engine.add_other_connection("a:out", "b:in").unwrap();
    assert!(rig.server.is_connected("a:out", "b:in"));
    assert_eq!(rig.engine.refresh_port_connections(), 1);

    rig.engine.clear_other_connections();
    assert!(rig.engine.other_connections().is_empty());
    assert!(!rig.server.is_connected("a:out", "b:in"));
}

/// Runs a cycle on another thread from inside `connect` and records whether
/// it was processed.
struct CycleOnConnect {
    inner: OfflineServer,
    engine: Arc<OnceLock<Weak<Engine>>>,
    processed: Arc<Mutex<Vec<bool>>>,
}

impl AudioServer for CycleOnConnect {
    fn client_name(&self) -> &str {
        self.inner.client_name()
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn register_port(&mut self, name: &str, kind: PortKind) -> keystage_core::Result<ServerPortId> {
        self.inner.register_port(name, kind)
    }

    fn unregister_port(&mut self, port: ServerPortId) -> keystage_core::Result<()> {
        self.inner.unregister_port(port)
    }

    fn port_name(&self, port: ServerPortId) -> Option<String> {
        self.inner.port_name(port)
    }

    fn connect(&mut self, source: &str, destination: &str) -> keystage_core::Result<()> {
        if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
            let mut cycle = self.inner.cycle(64);
            let processed = std::thread::scope(|s| {
                s.spawn(|| engine.process(&mut cycle)).join().unwrap()
            });
            self.processed.lock().push(processed);
        }
        self.inner.connect(source, destination)
    }

    fn disconnect(&mut self, source: &str, destination: &str) -> keystage_core::Result<()> {
        self.inner.disconnect(source, destination)
    }

    fn remote_ports(&self, kind: PortKind) -> Vec<String> {
        self.inner.remote_ports(kind)
    }

    fn set_callbacks(&mut self, callbacks: Arc<ServerCallbacks>) {
        self.inner.set_callbacks(callbacks)
    }
}

/// Talking to the server about connections leaves the audio thread running.
#[test]
fn test_connections_do_not_stall_processing() {
    init_tracing();
    let inner = OfflineServer::new("keystage", 48000);
    let slot = Arc::new(OnceLock::new());
    let processed = Arc::new(Mutex::new(Vec::new()));
    let server = CycleOnConnect {
        inner: inner.clone(),
        engine: Arc::clone(&slot),
        processed: Arc::clone(&processed),
    };
    let engine = Arc::new(Engine::builder().server(server).build().unwrap());
    slot.set(Arc::downgrade(&engine)).unwrap();

    inner.add_remote_port("keyboard:out", PortKind::MidiOut);
    inner.add_remote_port("synth:in", PortKind::MidiIn);
    let input = engine.add_midi_port("in", PortDirection::Input).unwrap();
    engine.add_port_connection(input, "keyboard:out").unwrap();
    engine.add_other_connection("keyboard:out", "synth:in").unwrap();
    assert_eq!(engine.refresh_port_connections(), 2);

    let processed = processed.lock();
    assert_eq!(processed.len(), 4);
    assert!(processed.iter().all(|&p| p));
}

#[test]
fn test_timer_notifications() {
    let rig = MidiRig::new();
    let notifications = rig.engine.notifications();
    rig.engine.on_timer();
    notifications.drain();

    rig.server.simulate_xrun();
    rig.cycle(&[MidiEvent::note_on(0, 0, 60, 100)]);
    rig.engine.on_timer();

    let got = notifications.drain();
    assert!(got.contains(&Notification::MidiRxAvailable(2)));
    assert!(got.contains(&Notification::Xrun));

    rig.engine.print("hello");
    assert_eq!(
        notifications.try_read(),
        Some(Notification::Print("hello".into()))
    );
}
