//! Per-route event classification.
//!
//! [`classify`] is a pure decision on what a route should do with an event;
//! the process callback then applies it. Releases are decided before the
//! route's activity is considered so that an inactive route still lets go of
//! notes, sustain and pitchbend it is holding.

use keystage_midi::{MidiEvent, MidiMessage, CC_SUSTAIN, SUSTAIN_THRESHOLD};

/// State a forwarded event leaves behind on the route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hold {
    None,
    Note,
    Sustain,
    Pitchbend,
}

/// Held state an event may release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    /// Replay the recorded note-ons for this note and channel.
    Note,
    /// Only forwarded if a sustain-on was recorded on this channel.
    Sustain,
    /// Only forwarded if a non-zero bend was recorded on this channel.
    Pitchbend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteAction {
    Skip,
    Forward(Hold),
    Release(Release),
}

#[inline]
pub fn is_sustain_down(value: u8) -> bool {
    value > SUSTAIN_THRESHOLD
}

/// Decide how a route handles `event`.
pub fn classify(event: &MidiEvent, route_active: bool) -> RouteAction {
    if event.is_note_off() {
        return RouteAction::Release(Release::Note);
    }
    match event.msg {
        MidiMessage::ControlChange {
            control: CC_SUSTAIN,
            value,
        } if !is_sustain_down(value) => return RouteAction::Release(Release::Sustain),
        MidiMessage::PitchBend { value: 0 } => return RouteAction::Release(Release::Pitchbend),
        MidiMessage::System { .. } => return RouteAction::Skip,
        _ => {}
    }

    if !route_active {
        return RouteAction::Skip;
    }

    match event.msg {
        MidiMessage::NoteOn { .. } => RouteAction::Forward(Hold::Note),
        MidiMessage::ControlChange {
            control: CC_SUSTAIN,
            ..
        } => RouteAction::Forward(Hold::Sustain),
        MidiMessage::PitchBend { .. } => RouteAction::Forward(Hold::Pitchbend),
        _ => RouteAction::Forward(Hold::None),
    }
}
