//! MIDI filters and zones.
//!
//! A [`MidiFilter`] is a pure predicate plus transform: [`MidiFilter::pass_filter`]
//! decides whether an event goes through, [`MidiFilter::modify`] rewrites it
//! (channel remap, zone transpose, velocity curve and limits, pitchbend range).
//! Neither touches `self` mutably. Stateful bank-select handling lives in
//! [`BankSelectTracker`](crate::BankSelectTracker) on the port or route.
//!
//! Filters are `Copy` so the engine can swap them on the audio thread without
//! allocating.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::{MidiEvent, MidiMessage, CC_SUSTAIN};
use crate::utils::offset_note;
use crate::velocity::VelocityMap;

/// Set of controller numbers (0-127) stored as a 128-bit mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct CcSet(u128);

impl CcSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub fn contains(&self, cc: u8) -> bool {
        cc < 128 && (self.0 >> cc) & 1 == 1
    }

    #[inline]
    pub fn insert(&mut self, cc: u8) {
        if cc < 128 {
            self.0 |= 1u128 << cc;
        }
    }

    #[inline]
    pub fn remove(&mut self, cc: u8) {
        if cc < 128 {
            self.0 &= !(1u128 << cc);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..128).filter(move |&cc| self.contains(cc))
    }
}

impl FromIterator<u8> for CcSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = CcSet::empty();
        for cc in iter {
            set.insert(cc);
        }
        set
    }
}

impl From<CcSet> for Vec<u8> {
    fn from(set: CcSet) -> Self {
        set.iter().collect()
    }
}

impl TryFrom<Vec<u8>> for CcSet {
    type Error = Error;

    fn try_from(list: Vec<u8>) -> Result<Self> {
        if let Some(bad) = list.iter().find(|&&cc| cc > 127) {
            return Err(Error::InvalidZone(format!("controller {} out of range", bad)));
        }
        Ok(list.into_iter().collect())
    }
}

/// Note/velocity range and the transforms applied to notes inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiZone {
    pub low_note: u8,
    pub high_note: u8,
    /// Semitones added to note on/off.
    pub note_offset: i32,
    pub low_velocity: u8,
    pub high_velocity: u8,
    /// Output velocity clamp, applied after the curve.
    pub velocity_limit_min: u8,
    pub velocity_limit_max: u8,
    pub velocity_map: VelocityMap,
    /// Output value for a full downward bend (-8192..=0).
    pub pitchbend_min: i16,
    /// Output value for a full upward bend (0..=8191).
    pub pitchbend_max: i16,
}

impl Default for MidiZone {
    fn default() -> Self {
        Self {
            low_note: 0,
            high_note: 127,
            note_offset: 0,
            low_velocity: 0,
            high_velocity: 127,
            velocity_limit_min: 0,
            velocity_limit_max: 127,
            velocity_map: VelocityMap::identity(),
            pitchbend_min: -8192,
            pitchbend_max: 8191,
        }
    }
}

impl MidiZone {
    /// Zone covering `low..=high` with all other settings at their defaults.
    pub fn range(low_note: u8, high_note: u8) -> Self {
        Self {
            low_note,
            high_note,
            ..Self::default()
        }
    }

    pub fn with_offset(mut self, note_offset: i32) -> Self {
        self.note_offset = note_offset;
        self
    }

    pub fn with_velocity_range(mut self, low: u8, high: u8) -> Self {
        self.low_velocity = low;
        self.high_velocity = high;
        self
    }

    pub fn with_velocity_limits(mut self, min: u8, max: u8) -> Self {
        self.velocity_limit_min = min;
        self.velocity_limit_max = max;
        self
    }

    pub fn with_velocity_map(mut self, map: VelocityMap) -> Self {
        self.velocity_map = map;
        self
    }

    pub fn with_pitchbend_range(mut self, min: i16, max: i16) -> Self {
        self.pitchbend_min = min;
        self.pitchbend_max = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.high_note > 127 || self.low_note > self.high_note {
            return Err(Error::InvalidZone(format!(
                "note range {}..={} invalid",
                self.low_note, self.high_note
            )));
        }
        if self.high_velocity > 127 || self.low_velocity > self.high_velocity {
            return Err(Error::InvalidZone(format!(
                "velocity range {}..={} invalid",
                self.low_velocity, self.high_velocity
            )));
        }
        if self.velocity_limit_max > 127 || self.velocity_limit_min > self.velocity_limit_max {
            return Err(Error::InvalidZone(format!(
                "velocity limits {}..={} invalid",
                self.velocity_limit_min, self.velocity_limit_max
            )));
        }
        if !(-127..=127).contains(&self.note_offset) {
            return Err(Error::InvalidZone(format!(
                "note offset {} out of range",
                self.note_offset
            )));
        }
        if !(-8192..=0).contains(&self.pitchbend_min) || !(0..=8191).contains(&self.pitchbend_max)
        {
            return Err(Error::InvalidZone(format!(
                "pitchbend range {}..={} invalid",
                self.pitchbend_min, self.pitchbend_max
            )));
        }
        Ok(())
    }

    #[inline]
    fn contains_note(&self, note: u8) -> bool {
        (self.low_note..=self.high_note).contains(&note)
    }

    #[inline]
    fn contains_velocity(&self, velocity: u8) -> bool {
        (self.low_velocity..=self.high_velocity).contains(&velocity)
    }

    fn map_velocity(&self, velocity: u8) -> u8 {
        self.velocity_map
            .apply(velocity)
            .clamp(self.velocity_limit_min, self.velocity_limit_max)
    }

    fn scale_pitchbend(&self, value: i16) -> i16 {
        let v = value as i32;
        let scaled = if v > 0 {
            v * self.pitchbend_max as i32 / 8191
        } else {
            v * -(self.pitchbend_min as i32) / 8192
        };
        scaled.clamp(-8192, 8191) as i16
    }
}

/// Per-port / per-route MIDI filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiFilter {
    pub zone: MidiZone,
    /// Controllers passed when `pass_all_cc` is false.
    pub pass_cc: CcSet,
    pub pass_all_cc: bool,
    pub pass_prog: bool,
    pub pass_pitchbend: bool,
    /// Channel and polyphonic pressure.
    pub pass_aftertouch: bool,
    /// Only events on this channel pass. `None` = any channel.
    pub in_channel: Option<u8>,
    /// Rewrite to this channel. `None` = keep the original channel.
    pub out_channel: Option<u8>,
    /// Routes with this set are not affected by the engine-wide transpose.
    pub ignore_global_transpose: bool,
}

impl Default for MidiFilter {
    fn default() -> Self {
        Self {
            zone: MidiZone::default(),
            pass_cc: [CC_SUSTAIN].into_iter().collect(),
            pass_all_cc: false,
            pass_prog: false,
            pass_pitchbend: true,
            pass_aftertouch: false,
            in_channel: None,
            out_channel: None,
            ignore_global_transpose: false,
        }
    }
}

impl MidiFilter {
    /// Filter that lets every channel voice message through unchanged.
    pub fn pass_all() -> Self {
        Self {
            pass_all_cc: true,
            pass_prog: true,
            pass_pitchbend: true,
            pass_aftertouch: true,
            ..Self::default()
        }
    }

    pub fn with_zone(mut self, zone: MidiZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_in_channel(mut self, channel: Option<u8>) -> Self {
        self.in_channel = channel;
        self
    }

    pub fn with_out_channel(mut self, channel: Option<u8>) -> Self {
        self.out_channel = channel;
        self
    }

    pub fn allow_cc(mut self, cc: u8) -> Self {
        self.pass_cc.insert(cc);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for ch in [self.in_channel, self.out_channel].into_iter().flatten() {
            if ch > 15 {
                return Err(Error::InvalidChannel(ch));
            }
        }
        self.zone.validate()
    }

    /// Whether `event` passes this filter.
    pub fn pass_filter(&self, event: &MidiEvent) -> bool {
        if event.is_system() {
            return false;
        }
        if let Some(ch) = self.in_channel {
            if event.channel != ch {
                return false;
            }
        }

        if event.is_note_off() {
            return event
                .note()
                .and_then(|n| offset_note(n, self.zone.note_offset))
                .is_some();
        }

        match event.msg {
            MidiMessage::NoteOn { note, velocity } => {
                self.zone.contains_note(note)
                    && self.zone.contains_velocity(velocity)
                    && offset_note(note, self.zone.note_offset).is_some()
            }
            MidiMessage::ControlChange { control, .. } => {
                self.pass_all_cc || self.pass_cc.contains(control)
            }
            MidiMessage::ProgramChange { .. } => self.pass_prog,
            MidiMessage::PitchBend { .. } => self.pass_pitchbend,
            MidiMessage::ChannelPressure { .. } | MidiMessage::PolyPressure { .. } => {
                self.pass_aftertouch
            }
            MidiMessage::NoteOff { .. } | MidiMessage::System { .. } => false,
        }
    }

    /// Apply channel remap and zone transforms. Call after [`pass_filter`](Self::pass_filter).
    pub fn modify(&self, event: &MidiEvent) -> MidiEvent {
        let mut out = *event;
        if let Some(ch) = self.out_channel {
            out.channel = ch & 0x0F;
        }

        let offset = self.zone.note_offset;
        out.msg = match event.msg {
            MidiMessage::NoteOn { note, velocity } if velocity > 0 => MidiMessage::NoteOn {
                note: offset_note(note, offset).unwrap_or(note),
                velocity: self.zone.map_velocity(velocity).max(1),
            },
            MidiMessage::NoteOn { note, .. } => MidiMessage::NoteOff {
                note: offset_note(note, offset).unwrap_or(note),
                velocity: 0,
            },
            MidiMessage::NoteOff { note, velocity } => MidiMessage::NoteOff {
                note: offset_note(note, offset).unwrap_or(note),
                velocity,
            },
            MidiMessage::PitchBend { value } => MidiMessage::PitchBend {
                value: self.zone.scale_pitchbend(value),
            },
            other => other,
        };
        out
    }
}
