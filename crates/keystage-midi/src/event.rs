//! RT-safe MIDI event types with sample-accurate timing.
//!
//! [`MidiEvent`] is `Copy` and never allocates, so it can move through the
//! audio thread freely. [`RawMidiEvent`] is the wire form handed out by the
//! audio server.

use core::fmt;

use crate::error::{Error, Result};
use crate::utils::{pitchbend_to_signed, signed_to_pitchbend, NoteName};

pub const CC_BANK_SELECT_MSB: u8 = 0;
pub const CC_BANK_SELECT_LSB: u8 = 32;
pub const CC_SUSTAIN: u8 = 64;
pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// CC64 values at or below this are treated as pedal up.
pub const SUSTAIN_THRESHOLD: u8 = 63;

/// Bank select pair carried alongside a program change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct BankSelect {
    pub msb: u8,
    pub lsb: u8,
}

impl BankSelect {
    #[inline]
    pub fn new(msb: u8, lsb: u8) -> Self {
        Self {
            msb: msb & 0x7F,
            lsb: lsb & 0x7F,
        }
    }

    /// Combined 14-bit bank number.
    #[inline]
    pub fn bank(&self) -> u16 {
        ((self.msb as u16) << 7) | self.lsb as u16
    }
}

/// Channel voice message payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MidiMessage {
    NoteOff { note: u8, velocity: u8 },
    NoteOn { note: u8, velocity: u8 },
    PolyPressure { note: u8, pressure: u8 },
    ControlChange { control: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelPressure { pressure: u8 },
    /// Signed bend, -8192..=8191, 0 = center.
    PitchBend { value: i16 },
    /// Anything that is not a channel voice message. Never routed.
    System { data: [u8; 3], len: u8 },
}

/// RT-safe MIDI event with sample-accurate frame offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    /// Offset within the current buffer (0 = first sample).
    pub frame_offset: usize,
    /// Zero-based channel (0-15).
    pub channel: u8,
    pub msg: MidiMessage,
    /// Set on program changes preceded by a complete bank select.
    pub bank: Option<BankSelect>,
}

impl MidiEvent {
    #[inline]
    pub fn new(frame_offset: usize, channel: u8, msg: MidiMessage) -> Self {
        Self {
            frame_offset,
            channel: channel & 0x0F,
            msg,
            bank: None,
        }
    }

    #[inline]
    pub fn note_on(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(frame_offset, channel, MidiMessage::NoteOn { note, velocity })
    }

    #[inline]
    pub fn note_off(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(frame_offset, channel, MidiMessage::NoteOff { note, velocity })
    }

    #[inline]
    pub fn control_change(frame_offset: usize, channel: u8, control: u8, value: u8) -> Self {
        Self::new(
            frame_offset,
            channel,
            MidiMessage::ControlChange { control, value },
        )
    }

    #[inline]
    pub fn program_change(frame_offset: usize, channel: u8, program: u8) -> Self {
        Self::new(frame_offset, channel, MidiMessage::ProgramChange { program })
    }

    #[inline]
    pub fn pitch_bend(frame_offset: usize, channel: u8, value: i16) -> Self {
        Self::new(
            frame_offset,
            channel,
            MidiMessage::PitchBend {
                value: value.clamp(-8192, 8191),
            },
        )
    }

    #[inline]
    pub fn aftertouch(frame_offset: usize, channel: u8, pressure: u8) -> Self {
        Self::new(frame_offset, channel, MidiMessage::ChannelPressure { pressure })
    }

    #[inline]
    pub fn poly_aftertouch(frame_offset: usize, channel: u8, note: u8, pressure: u8) -> Self {
        Self::new(
            frame_offset,
            channel,
            MidiMessage::PolyPressure { note, pressure },
        )
    }

    #[inline]
    pub fn note_on_builder(note: u8, velocity: u8) -> MidiEventBuilder {
        MidiEventBuilder::new(MidiMessage::NoteOn { note, velocity })
    }

    #[inline]
    pub fn note_off_builder(note: u8) -> MidiEventBuilder {
        MidiEventBuilder::new(MidiMessage::NoteOff { note, velocity: 0 })
    }

    #[inline]
    pub fn cc_builder(control: u8, value: u8) -> MidiEventBuilder {
        MidiEventBuilder::new(MidiMessage::ControlChange { control, value })
    }

    #[inline]
    pub fn program_builder(program: u8) -> MidiEventBuilder {
        MidiEventBuilder::new(MidiMessage::ProgramChange { program })
    }

    #[inline]
    pub fn bend_builder(value: i16) -> MidiEventBuilder {
        MidiEventBuilder::new(MidiMessage::PitchBend {
            value: value.clamp(-8192, 8191),
        })
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self.msg, MidiMessage::NoteOn { velocity, .. } if velocity > 0)
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        matches!(
            self.msg,
            MidiMessage::NoteOff { .. } | MidiMessage::NoteOn { velocity: 0, .. }
        )
    }

    #[inline]
    pub fn is_system(&self) -> bool {
        matches!(self.msg, MidiMessage::System { .. })
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        match self.msg {
            MidiMessage::NoteOn { note, .. }
            | MidiMessage::NoteOff { note, .. }
            | MidiMessage::PolyPressure { note, .. } => Some(note),
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        match self.msg {
            MidiMessage::NoteOn { velocity, .. } | MidiMessage::NoteOff { velocity, .. } => {
                Some(velocity)
            }
            _ => None,
        }
    }

    /// `(control, value)` for control changes.
    #[inline]
    pub fn cc(&self) -> Option<(u8, u8)> {
        match self.msg {
            MidiMessage::ControlChange { control, value } => Some((control, value)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_bank_select(&self) -> bool {
        matches!(
            self.cc(),
            Some((CC_BANK_SELECT_MSB, _)) | Some((CC_BANK_SELECT_LSB, _))
        )
    }

    /// Copy of this event on another channel.
    #[inline]
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel & 0x0F;
        self
    }

    /// The CC0/CC32 pair that must precede this program change on the wire.
    pub fn bank_select_events(&self) -> Option<[MidiEvent; 2]> {
        match (self.msg, self.bank) {
            (MidiMessage::ProgramChange { .. }, Some(bank)) => Some([
                MidiEvent::control_change(
                    self.frame_offset,
                    self.channel,
                    CC_BANK_SELECT_MSB,
                    bank.msb,
                ),
                MidiEvent::control_change(
                    self.frame_offset,
                    self.channel,
                    CC_BANK_SELECT_LSB,
                    bank.lsb,
                ),
            ]),
            _ => None,
        }
    }

    /// Encode into `out`, returning the number of valid bytes. Never allocates.
    pub fn write_raw(&self, out: &mut [u8; 3]) -> usize {
        let ch = self.channel & 0x0F;
        match self.msg {
            MidiMessage::NoteOff { note, velocity } => {
                *out = [0x80 | ch, note & 0x7F, velocity & 0x7F];
                3
            }
            MidiMessage::NoteOn { note, velocity } => {
                *out = [0x90 | ch, note & 0x7F, velocity & 0x7F];
                3
            }
            MidiMessage::PolyPressure { note, pressure } => {
                *out = [0xA0 | ch, note & 0x7F, pressure & 0x7F];
                3
            }
            MidiMessage::ControlChange { control, value } => {
                *out = [0xB0 | ch, control & 0x7F, value & 0x7F];
                3
            }
            MidiMessage::ProgramChange { program } => {
                *out = [0xC0 | ch, program & 0x7F, 0];
                2
            }
            MidiMessage::ChannelPressure { pressure } => {
                *out = [0xD0 | ch, pressure & 0x7F, 0];
                2
            }
            MidiMessage::PitchBend { value } => {
                let (lsb, msb) = signed_to_pitchbend(value);
                *out = [0xE0 | ch, lsb, msb];
                3
            }
            MidiMessage::System { data, len } => {
                *out = data;
                len as usize
            }
        }
    }

    /// Parse raw bytes. Note-on with velocity 0 becomes note-off.
    pub fn from_bytes(bytes: &[u8], frame_offset: usize) -> Result<Self> {
        let status = *bytes.first().ok_or(Error::Parse("empty message"))?;
        if status < 0x80 {
            return Err(Error::Parse("missing status byte"));
        }

        let channel = status & 0x0F;
        let data = |i: usize| -> Result<u8> {
            bytes
                .get(i)
                .map(|b| b & 0x7F)
                .ok_or(Error::Parse("truncated message"))
        };

        let msg = match status & 0xF0 {
            0x80 => MidiMessage::NoteOff {
                note: data(1)?,
                velocity: data(2)?,
            },
            0x90 => {
                let (note, velocity) = (data(1)?, data(2)?);
                if velocity == 0 {
                    MidiMessage::NoteOff { note, velocity: 0 }
                } else {
                    MidiMessage::NoteOn { note, velocity }
                }
            }
            0xA0 => MidiMessage::PolyPressure {
                note: data(1)?,
                pressure: data(2)?,
            },
            0xB0 => MidiMessage::ControlChange {
                control: data(1)?,
                value: data(2)?,
            },
            0xC0 => MidiMessage::ProgramChange { program: data(1)? },
            0xD0 => MidiMessage::ChannelPressure { pressure: data(1)? },
            0xE0 => MidiMessage::PitchBend {
                value: pitchbend_to_signed(data(1)?, data(2)?),
            },
            _ => {
                let len = bytes.len().min(3);
                let mut raw = [0u8; 3];
                raw[..len].copy_from_slice(&bytes[..len]);
                return Ok(Self {
                    frame_offset,
                    channel: 0,
                    msg: MidiMessage::System {
                        data: raw,
                        len: len as u8,
                    },
                    bank: None,
                });
            }
        };

        Ok(Self::new(frame_offset, channel, msg))
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let MidiMessage::System { data, len } = self.msg {
            write!(f, "System")?;
            for b in &data[..len as usize] {
                write!(f, " {:02X}", b)?;
            }
            return Ok(());
        }

        write!(f, "Ch {} ", self.channel + 1)?;
        match self.msg {
            MidiMessage::NoteOn { note, velocity } => {
                write!(f, "Noteon {}, {}  ({})", note, velocity, NoteName(note))
            }
            MidiMessage::NoteOff { note, velocity } => {
                write!(f, "Noteoff {}, {}  ({})", note, velocity, NoteName(note))
            }
            MidiMessage::PolyPressure { note, pressure } => {
                write!(f, "Poly aftertouch {}, {}", note, pressure)
            }
            MidiMessage::ControlChange { control, value } => {
                write!(f, "CC {}, {}", control, value)
            }
            MidiMessage::ProgramChange { program } => match self.bank {
                Some(bank) => write!(f, "Prog {} Bank {}", program, bank.bank()),
                None => write!(f, "Program {}", program),
            },
            MidiMessage::ChannelPressure { pressure } => write!(f, "Aftertouch {}", pressure),
            MidiMessage::PitchBend { value } => write!(f, "Pitchbend {}", value),
            MidiMessage::System { .. } => Ok(()),
        }
    }
}

/// Raw 3-byte MIDI event as delivered by the audio server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RawMidiEvent {
    pub frame_offset: usize,
    pub data: [u8; 3],
    /// Valid bytes in `data` (1-3).
    pub len: u8,
}

impl RawMidiEvent {
    #[inline]
    pub fn new(frame_offset: usize, data: [u8; 3], len: u8) -> Self {
        Self {
            frame_offset,
            data,
            len: len.min(3),
        }
    }

    /// Copy up to three bytes from `bytes`.
    pub fn from_slice(frame_offset: usize, bytes: &[u8]) -> Self {
        let len = bytes.len().min(3);
        let mut data = [0u8; 3];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            frame_offset,
            data,
            len: len as u8,
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.data[0] & 0xF0
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.data[0] & 0x0F
    }

    #[inline]
    pub fn to_midi_event(&self) -> Result<MidiEvent> {
        MidiEvent::from_bytes(self.bytes(), self.frame_offset)
    }
}

impl From<MidiEvent> for RawMidiEvent {
    fn from(event: MidiEvent) -> Self {
        let mut data = [0u8; 3];
        let len = event.write_raw(&mut data);
        Self {
            frame_offset: event.frame_offset,
            data,
            len: len as u8,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MidiEventBuilder {
    frame_offset: usize,
    channel: u8,
    msg: MidiMessage,
    bank: Option<BankSelect>,
}

impl MidiEventBuilder {
    #[inline]
    fn new(msg: MidiMessage) -> Self {
        Self {
            frame_offset: 0,
            channel: 0,
            msg,
            bank: None,
        }
    }

    #[inline]
    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = channel & 0x0F;
        self
    }

    #[inline]
    pub fn offset(mut self, frame_offset: usize) -> Self {
        self.frame_offset = frame_offset;
        self
    }

    #[inline]
    pub fn bank(mut self, msb: u8, lsb: u8) -> Self {
        self.bank = Some(BankSelect::new(msb, lsb));
        self
    }

    #[inline]
    pub fn build(self) -> MidiEvent {
        MidiEvent {
            frame_offset: self.frame_offset,
            channel: self.channel,
            msg: self.msg,
            bank: self.bank,
        }
    }
}
