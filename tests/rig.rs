//! End-to-end tests for the keystage rig.

use std::time::Duration;

use keystage::prelude::*;
use keystage::{Error, OfflineServer, PortKind};

fn offline_rig(timer: bool) -> (OfflineServer, Keystage) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let server = OfflineServer::new("stage", 44100);
    let rig = Keystage::builder()
        .server(server.clone())
        .fade_secs(0.002)
        .timer(timer)
        .build()
        .unwrap();
    (server, rig)
}

#[test]
fn test_server_rate_wins() {
    let (_, rig) = offline_rig(false);
    assert_eq!(rig.config().sample_rate, 44100);
    assert_eq!(rig.client_name(), "stage");
    #[cfg(feature = "soundfont")]
    assert_eq!(rig.soundfont().sample_rate(), 44100);
}

#[test]
fn test_split_keyboard() {
    let (server, rig) = offline_rig(false);
    let keys = rig.add_midi_port("keys", PortDirection::Input).unwrap();
    let lower = rig.add_midi_port("lower", PortDirection::Output).unwrap();
    let upper = rig.add_midi_port("upper", PortDirection::Output).unwrap();

    let zones = [
        (lower, MidiZone::range(0, 59).with_offset(12)),
        (upper, MidiZone::range(60, 127)),
    ];
    for (port, zone) in zones {
        let route = rig
            .add_midi_route_between(keys, MidiDestination::Port(port))
            .unwrap();
        rig.set_route_midi_filter(route, MidiFilter::default().with_zone(zone))
            .unwrap();
        rig.set_midi_route_active(route, true).unwrap();
    }

    let mut cycle = server.cycle(128);
    let input = rig.server_port(keys).unwrap();
    cycle.push_midi(input, MidiEvent::note_on(0, 0, 48, 90));
    cycle.push_midi(input, MidiEvent::note_on(10, 0, 72, 90));
    assert!(rig.engine().process(&mut cycle));

    let low = cycle.midi_out_events(rig.server_port(lower).unwrap());
    let high = cycle.midi_out_events(rig.server_port(upper).unwrap());
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].note(), Some(60));
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].note(), Some(72));
    assert_eq!(high[0].frame_offset, 10);
}

#[test]
fn test_timer_delivers_notifications() {
    let (server, mut rig) = offline_rig(true);
    assert!(rig.is_timer_running());
    let notifications = rig.notifications();

    server.simulate_xrun();
    let mut seen_xrun = false;
    while let Some(n) = notifications.read_timeout(Duration::from_secs(2)) {
        if n == Notification::Xrun {
            seen_xrun = true;
            break;
        }
    }
    assert!(seen_xrun);

    rig.stop_timer();
    assert!(!rig.is_timer_running());
    rig.start_timer().unwrap();
    assert!(rig.is_timer_running());
}

#[test]
fn test_errors_convert() {
    let (_, rig) = offline_rig(false);
    let out = rig.add_midi_port("out", PortDirection::Output).unwrap();
    let err: Error = rig
        .set_port_filter(out, MidiFilter::pass_all())
        .unwrap_err()
        .into();
    assert!(matches!(
        err,
        Error::Core(keystage::core::Error::WrongPortKind {
            expected: PortKind::MidiIn,
            found: PortKind::MidiOut
        })
    ));
}

#[cfg(feature = "soundfont")]
mod soundfont {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_layer_requires_matching_ports() {
        let (_, rig) = offline_rig(false);
        let keys = rig.add_midi_port("keys", PortDirection::Input).unwrap();
        let left = rig.add_audio_port("left", PortDirection::Output).unwrap();
        let right = rig.add_midi_port("right", PortDirection::Output).unwrap();

        let result = rig.add_soundfont_layer("piano.sf2", 0, 0, keys, (left, right));
        assert!(matches!(
            result,
            Err(Error::Core(keystage::core::Error::WrongPortKind { .. }))
        ));
        assert!(rig.midi_routes().is_empty());
    }

    #[test]
    fn test_layer_with_bad_soundfont_leaves_nothing_behind() {
        let (_, rig) = offline_rig(false);
        let keys = rig.add_midi_port("keys", PortDirection::Input).unwrap();
        let left = rig.add_audio_port("left", PortDirection::Output).unwrap();
        let right = rig.add_audio_port("right", PortDirection::Output).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not RIFF").unwrap();

        let result = rig.add_soundfont_layer(file.path(), 0, 0, keys, (left, right));
        assert!(matches!(
            result,
            Err(Error::Synth(keystage::synth::Error::SoundFont(_)))
        ));
        assert!(rig.midi_routes().is_empty());
        assert!(rig.audio_routes().is_empty());
        assert!(rig.soundfont().is_empty());
    }
}
