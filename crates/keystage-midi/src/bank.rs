//! Per-channel bank select tracking.
//!
//! ```text
//! CC0 (msb) ──┐
//! CC32 (lsb) ─┼──> pending[ch] ──> ProgramChange annotated with (msb, lsb)
//! other ──────┘ clears pending
//! ```

use crate::event::{BankSelect, MidiEvent, MidiMessage, CC_BANK_SELECT_LSB, CC_BANK_SELECT_MSB};

/// Merges CC0/CC32 into the following program change.
///
/// One tracker lives on every MIDI input port and one on every MIDI route, each
/// with independent state. RT-safe: fixed-size, no allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BankSelectTracker {
    msb: [Option<u8>; 16],
    lsb: [Option<u8>; 16],
}

impl BankSelectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update state for `event` and annotate it if it is a program change.
    pub fn process(&mut self, event: &mut MidiEvent) {
        if event.is_system() {
            return;
        }
        let ch = (event.channel & 0x0F) as usize;

        match event.msg {
            MidiMessage::ControlChange {
                control: CC_BANK_SELECT_MSB,
                value,
            } => self.msb[ch] = Some(value),
            MidiMessage::ControlChange {
                control: CC_BANK_SELECT_LSB,
                value,
            } => self.lsb[ch] = Some(value),
            MidiMessage::ControlChange { .. } => self.clear_channel(ch),
            MidiMessage::ProgramChange { .. } => {
                event.bank = match (self.msb[ch], self.lsb[ch]) {
                    (Some(msb), Some(lsb)) => Some(BankSelect::new(msb, lsb)),
                    _ => None,
                };
                self.clear_channel(ch);
            }
            _ => self.clear_channel(ch),
        }
    }

    /// Pending `(msb, lsb)` for a channel, if both halves have arrived.
    pub fn pending(&self, channel: u8) -> Option<BankSelect> {
        let ch = (channel & 0x0F) as usize;
        match (self.msb[ch], self.lsb[ch]) {
            (Some(msb), Some(lsb)) => Some(BankSelect::new(msb, lsb)),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    fn clear_channel(&mut self, ch: usize) {
        self.msb[ch] = None;
        self.lsb[ch] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(ch: u8, control: u8, value: u8) -> MidiEvent {
        MidiEvent::control_change(0, ch, control, value)
    }

    #[test]
    fn test_program_change_annotated() {
        let mut tracker = BankSelectTracker::new();
        let mut msb = cc(0, 0, 2);
        let mut lsb = cc(0, 32, 5);
        tracker.process(&mut msb);
        tracker.process(&mut lsb);
        assert_eq!(tracker.pending(0), Some(BankSelect::new(2, 5)));

        let mut pc = MidiEvent::program_change(0, 0, 10);
        tracker.process(&mut pc);
        assert_eq!(pc.bank, Some(BankSelect::new(2, 5)));
        assert_eq!(tracker.pending(0), None);
    }

    #[test]
    fn test_unrelated_cc_clears_pending() {
        let mut tracker = BankSelectTracker::new();
        tracker.process(&mut cc(0, 0, 2));
        tracker.process(&mut cc(0, 32, 5));
        tracker.process(&mut cc(0, 7, 100));

        let mut pc = MidiEvent::program_change(0, 0, 10);
        tracker.process(&mut pc);
        assert_eq!(pc.bank, None);
    }

    #[test]
    fn test_non_cc_clears_pending() {
        let mut tracker = BankSelectTracker::new();
        tracker.process(&mut cc(0, 0, 2));
        tracker.process(&mut cc(0, 32, 5));
        tracker.process(&mut MidiEvent::note_on(0, 0, 60, 100));
        assert_eq!(tracker.pending(0), None);
    }

    #[test]
    fn test_msb_only_clears_stale_annotation() {
        let mut tracker = BankSelectTracker::new();
        tracker.process(&mut cc(0, 0, 2));

        let mut pc = MidiEvent::program_builder(4).bank(9, 9).build();
        tracker.process(&mut pc);
        assert_eq!(pc.bank, None);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut tracker = BankSelectTracker::new();
        tracker.process(&mut cc(1, 0, 3));
        tracker.process(&mut cc(1, 32, 0));
        tracker.process(&mut MidiEvent::note_on(0, 2, 60, 100));

        let mut pc = MidiEvent::program_change(0, 1, 0);
        tracker.process(&mut pc);
        assert_eq!(pc.bank, Some(BankSelect::new(3, 0)));
    }
}
