//! MIDI and audio routes.

use keystage_midi::{BankSelectTracker, MidiFilter};

use crate::config::NOTE_RECORDS_PER_ROUTE;
use crate::handles::{PortId, SynthId};
use crate::slot_list::SlotList;
use crate::synth::StereoSide;

/// Where a MIDI route delivers its events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MidiDestination {
    Port(PortId),
    Synth(SynthId),
}

/// Where an audio route takes its samples from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioSource {
    Port(PortId),
    Synth { synth: SynthId, side: StereoSide },
}

/// A forwarded note-on, kept until its note-off.
///
/// Keyed by the note and channel as they arrived at the route; stores what was
/// actually sent so the note-off releases exactly that note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoteOnRecord {
    pub source_note: u8,
    pub source_channel: u8,
    pub note: u8,
    pub channel: u8,
    /// Global transpose applied at note-on time, zero if the route ignored
    /// it. Already included in `note`.
    pub transpose: i32,
}

/// Mute/solo resolution shared by both route kinds.
#[inline]
pub(crate) fn effectively_active(active: bool, mute: bool, solo: bool, any_solo: bool) -> bool {
    active && !mute && (!any_solo || solo)
}

#[derive(Debug)]
pub(crate) struct MidiRoute {
    pub source: Option<PortId>,
    pub destination: Option<MidiDestination>,
    pub active: bool,
    pub mute: bool,
    pub solo: bool,
    pub filter: MidiFilter,
    pub bank: BankSelectTracker,
    pub notes: SlotList<NoteOnRecord, NOTE_RECORDS_PER_ROUTE>,
    /// Per source channel: output channel a sustain-on was sent on.
    pub sustain: [Option<u8>; 16],
    /// Per source channel: output channel a non-zero pitchbend was sent on.
    pub pitchbend: [Option<u8>; 16],
}

impl MidiRoute {
    pub fn new(source: Option<PortId>, destination: Option<MidiDestination>) -> Self {
        Self {
            source,
            destination,
            active: false,
            mute: false,
            solo: false,
            filter: MidiFilter::default(),
            bank: BankSelectTracker::new(),
            notes: SlotList::new(),
            sustain: [None; 16],
            pitchbend: [None; 16],
        }
    }

    #[inline]
    pub fn is_effectively_active(&self, any_solo: bool) -> bool {
        effectively_active(self.active, self.mute, self.solo, any_solo)
    }

    /// Forget held notes, sustain and pitchbend.
    pub fn clear_held(&mut self) {
        self.notes.clear();
        self.sustain = [None; 16];
        self.pitchbend = [None; 16];
        self.bank.reset();
    }

    pub fn info(&self) -> MidiRouteInfo {
        MidiRouteInfo {
            source: self.source,
            destination: self.destination,
            active: self.active,
            mute: self.mute,
            solo: self.solo,
            filter: self.filter,
            held_notes: self.notes.count(),
            sustain_held: self.sustain.iter().any(Option::is_some),
            pitchbend_held: self.pitchbend.iter().any(Option::is_some),
        }
    }
}

#[derive(Debug)]
pub(crate) struct AudioRoute {
    pub source: Option<AudioSource>,
    pub destination: Option<PortId>,
    pub active: bool,
    pub mute: bool,
    pub solo: bool,
    pub gain: f32,
    /// Index into the fade table: 0 = full gain, last = silent.
    pub fade_pos: usize,
    pub level_sum: f32,
    pub level_samples: usize,
    pub level_cycles: u32,
    /// Last level reported to telemetry.
    pub last_level: f32,
}

impl AudioRoute {
    pub fn new(source: Option<AudioSource>, destination: Option<PortId>, fade_end: usize) -> Self {
        Self {
            source,
            destination,
            active: false,
            mute: false,
            solo: false,
            gain: 1.0,
            fade_pos: fade_end,
            level_sum: 0.0,
            level_samples: 0,
            level_cycles: 0,
            last_level: 0.0,
        }
    }

    #[inline]
    pub fn is_effectively_active(&self, any_solo: bool) -> bool {
        effectively_active(self.active, self.mute, self.solo, any_solo)
    }

    pub fn info(&self) -> AudioRouteInfo {
        AudioRouteInfo {
            source: self.source,
            destination: self.destination,
            active: self.active,
            mute: self.mute,
            solo: self.solo,
            gain: self.gain,
        }
    }
}

/// Snapshot of a MIDI route.
#[derive(Clone, Debug, PartialEq)]
pub struct MidiRouteInfo {
    pub source: Option<PortId>,
    pub destination: Option<MidiDestination>,
    pub active: bool,
    pub mute: bool,
    pub solo: bool,
    pub filter: MidiFilter,
    pub held_notes: usize,
    pub sustain_held: bool,
    pub pitchbend_held: bool,
}

/// Snapshot of an audio route.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioRouteInfo {
    pub source: Option<AudioSource>,
    pub destination: Option<PortId>,
    pub active: bool,
    pub mute: bool,
    pub solo: bool,
    pub gain: f32,
}
