//! [`SynthBridge`] over RustySynth synthesizers, one per program.
//!
//! ```text
//!   control thread                      audio thread
//!   add_program(path, bank, prog) ─┐    process_event(h, ev) ─┐
//!   remove_program(h)              ├──> Mutex<programs> <─────┤ try_lock, skip on
//!   set_gain(h, g)                ─┘                          │ contention
//!                                       render_block(h, l, r) ┘
//! ```
//!
//! Every program plays on channel 0 of its own synthesizer. Incoming events
//! are rewritten to channel 0 whatever channel they arrive on.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keystage_core::{SynthBridge, SynthHandle};
use keystage_midi::{MidiEvent, MidiMessage, CC_ALL_NOTES_OFF, CC_BANK_SELECT_MSB};
use parking_lot::Mutex;
use rustysynth::{Synthesizer, SynthesizerSettings};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::library::SoundFontLibrary;

/// Sample rates RustySynth accepts.
const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 16000..=192000;

struct Program {
    synth: Synthesizer,
    bank: u16,
    program: u8,
}

/// The events that go on the wire for `event`, on channel 0: bank select
/// ahead of an annotated program change, then the event itself.
fn wire_events(event: &MidiEvent) -> SmallVec<[MidiEvent; 3]> {
    let event = event.with_channel(0);
    let mut wire = SmallVec::new();
    if let Some(bank) = event.bank_select_events() {
        wire.extend(bank);
    }
    wire.push(event);
    wire
}

fn send(synth: &mut Synthesizer, event: &MidiEvent) {
    let mut raw = [0u8; 3];
    if event.write_raw(&mut raw) == 0 {
        return;
    }
    synth.process_midi_message(
        0,
        (raw[0] & 0xF0) as i32,
        raw[1] as i32,
        raw[2] as i32,
    );
}

/// SoundFont programs driven by the engine.
pub struct SoundFontBridge {
    sample_rate: u32,
    library: Arc<SoundFontLibrary>,
    programs: Mutex<HashMap<SynthHandle, Program>>,
    next_handle: AtomicU64,
}

impl SoundFontBridge {
    pub fn new(sample_rate: u32) -> Result<Self> {
        Self::with_library(sample_rate, Arc::new(SoundFontLibrary::new()))
    }

    /// Bridge sharing an existing SoundFont cache.
    pub fn with_library(sample_rate: u32, library: Arc<SoundFontLibrary>) -> Result<Self> {
        if !SAMPLE_RATE_RANGE.contains(&sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range ({}-{} Hz)",
                sample_rate,
                SAMPLE_RATE_RANGE.start(),
                SAMPLE_RATE_RANGE.end()
            )));
        }
        Ok(Self {
            sample_rate,
            library,
            programs: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn library(&self) -> &Arc<SoundFontLibrary> {
        &self.library
    }

    /// Create a synthesizer playing `bank`/`program` from a SoundFont.
    pub fn add_program(&self, path: impl AsRef<Path>, bank: u16, program: u8) -> Result<SynthHandle> {
        let path = path.as_ref();
        if bank > 127 || program > 127 {
            return Err(Error::InvalidConfig(format!(
                "bank {} / program {} out of range (0-127)",
                bank, program
            )));
        }

        let font = self.library.load(path)?;
        if !font
            .get_presets()
            .iter()
            .any(|p| p.get_bank_number() == bank as i32 && p.get_patch_number() == program as i32)
        {
            tracing::warn!(
                "{} has no preset {}:{}, the synth will fall back to its default",
                path.display(),
                bank,
                program
            );
        }

        let settings = SynthesizerSettings::new(self.sample_rate as i32);
        let mut synth = Synthesizer::new(&font, &settings)
            .map_err(|e| Error::SoundFont(format!("Failed to create synthesizer: {}", e)))?;
        synth.process_midi_message(0, 0xB0, CC_BANK_SELECT_MSB as i32, bank as i32);
        synth.process_midi_message(0, 0xC0, program as i32, 0);

        let handle = SynthHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.programs.lock().insert(
            handle,
            Program {
                synth,
                bank,
                program,
            },
        );
        tracing::info!(
            "Added SoundFont program {}:{} from {} as {:?}",
            bank,
            program,
            path.display(),
            handle
        );
        Ok(handle)
    }

    /// Remove a program. Blocks until the audio thread is out of the bridge.
    pub fn remove_program(&self, handle: SynthHandle) -> Result<()> {
        let program = self
            .programs
            .lock()
            .remove(&handle)
            .ok_or(Error::ProgramNotFound)?;
        // Synthesizer is dropped here, outside the lock.
        drop(program);
        tracing::debug!("Removed SoundFont program {:?}", handle);
        Ok(())
    }

    /// `(bank, program)` a handle was created with.
    pub fn program(&self, handle: SynthHandle) -> Option<(u16, u8)> {
        self.programs
            .lock()
            .get(&handle)
            .map(|p| (p.bank, p.program))
    }

    pub fn gain(&self, handle: SynthHandle) -> Option<f32> {
        self.programs
            .lock()
            .get(&handle)
            .map(|p| p.synth.get_master_volume())
    }

    pub fn set_gain(&self, handle: SynthHandle, gain: f32) -> Result<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(Error::InvalidConfig(format!("gain {} is invalid", gain)));
        }
        let mut programs = self.programs.lock();
        let program = programs.get_mut(&handle).ok_or(Error::ProgramNotFound)?;
        program.synth.set_master_volume(gain);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.programs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.lock().is_empty()
    }
}

impl SynthBridge for SoundFontBridge {
    fn process_event(&self, handle: SynthHandle, event: &MidiEvent) -> bool {
        if event.is_system() {
            return false;
        }
        let Some(mut programs) = self.programs.try_lock() else {
            return false;
        };
        let Some(program) = programs.get_mut(&handle) else {
            return false;
        };

        for wire in wire_events(event) {
            send(&mut program.synth, &wire);
        }
        // Treat all-notes-off as a panic and cut the tails too.
        if let MidiMessage::ControlChange {
            control: CC_ALL_NOTES_OFF,
            ..
        } = event.msg
        {
            program.synth.note_off_all_channel(0, true);
        }
        true
    }

    fn render_block(&self, handle: SynthHandle, left: &mut [f32], right: &mut [f32]) -> usize {
        let Some(mut programs) = self.programs.try_lock() else {
            return 0;
        };
        let Some(program) = programs.get_mut(&handle) else {
            return 0;
        };
        let frames = left.len().min(right.len());
        program
            .synth
            .render(&mut left[..frames], &mut right[..frames]);
        frames
    }
}

impl std::fmt::Debug for SoundFontBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundFontBridge")
            .field("sample_rate", &self.sample_rate)
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}
