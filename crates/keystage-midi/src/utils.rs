//! MIDI utility functions

use core::fmt;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Displays a note number as e.g. `C5` (note 60).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteName(pub u8);

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let note = self.0 & 0x7F;
        write!(f, "{}{}", NOTE_NAMES[(note % 12) as usize], note / 12)
    }
}

/// Two 7-bit data bytes to a signed bend in -8192..=8191.
#[inline]
pub fn pitchbend_to_signed(lsb: u8, msb: u8) -> i16 {
    ((((msb & 0x7F) as i16) << 7) | (lsb & 0x7F) as i16) - 8192
}

/// Signed bend to `(lsb, msb)` data bytes. Out-of-range values are clamped.
#[inline]
pub fn signed_to_pitchbend(value: i16) -> (u8, u8) {
    let raw = (value.clamp(-8192, 8191) + 8192) as u16;
    ((raw & 0x7F) as u8, ((raw >> 7) & 0x7F) as u8)
}

/// `note + offset` if the result is a valid note number.
#[inline]
pub fn offset_note(note: u8, offset: i32) -> Option<u8> {
    let n = note as i32 + offset;
    (0..=127).contains(&n).then_some(n as u8)
}

/// `note + offset` clamped into 0..=127.
#[inline]
pub fn clamp_note(note: u8, offset: i32) -> u8 {
    (note as i32 + offset).clamp(0, 127) as u8
}

#[inline]
pub fn velocity_to_gain(velocity: u8) -> f32 {
    velocity as f32 / 127.0
}
