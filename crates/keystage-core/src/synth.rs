//! Synthesizer bridge contract.
//!
//! The engine drives an embedded synthesizer through [`SynthBridge`]. Both
//! methods are called from the audio thread and must not block: an
//! implementation that guards its synth with a lock uses `try_lock` and
//! reports contention by returning `false` / `0`.

use keystage_midi::MidiEvent;

/// Bridge-side identity of one synth program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SynthHandle(pub u64);

pub trait SynthBridge: Send + Sync {
    /// Deliver one event. Returns false if it was dropped.
    fn process_event(&self, handle: SynthHandle, event: &MidiEvent) -> bool;

    /// Render `left.len()` frames (`left` and `right` have equal length).
    /// Returns the number of frames written; 0 on contention.
    fn render_block(&self, handle: SynthHandle, left: &mut [f32], right: &mut [f32]) -> usize;
}

/// Which side of a stereo synth an audio route taps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StereoSide {
    Left,
    Right,
}
