//! SoundFont file loading and caching.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use rustysynth::SoundFont;

use crate::error::{Error, Result};

/// One preset of a loaded SoundFont.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresetInfo {
    pub name: String,
    pub bank: u16,
    pub program: u8,
}

/// Loaded SoundFonts, keyed by path. Each file is parsed once and shared by
/// every synth program that uses it.
#[derive(Default)]
pub struct SoundFontLibrary {
    fonts: DashMap<PathBuf, Arc<SoundFont>>,
}

impl SoundFontLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a SoundFont from file or return the cached one.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<SoundFont>> {
        let path = path.as_ref();
        if let Some(font) = self.fonts.get(path) {
            return Ok(Arc::clone(font.value()));
        }

        // Parse outside the map so concurrent loads of other files proceed.
        let mut reader = BufReader::new(File::open(path)?);
        let font = Arc::new(SoundFont::new(&mut reader).map_err(|e| {
            Error::SoundFont(format!(
                "Failed to parse SoundFont file '{}': {}",
                path.display(),
                e
            ))
        })?);
        tracing::debug!(
            "Loaded SoundFont {} ({} presets)",
            path.display(),
            font.get_presets().len()
        );

        Ok(Arc::clone(
            self.fonts
                .entry(path.to_path_buf())
                .or_insert(font)
                .value(),
        ))
    }

    /// Presets of a SoundFont, sorted by bank then program.
    pub fn presets(&self, path: impl AsRef<Path>) -> Result<Vec<PresetInfo>> {
        let font = self.load(path)?;
        let mut presets: Vec<PresetInfo> = font
            .get_presets()
            .iter()
            .map(|p| PresetInfo {
                name: p.get_name().to_string(),
                bank: p.get_bank_number().clamp(0, u16::MAX as i32) as u16,
                program: p.get_patch_number().clamp(0, 127) as u8,
            })
            .collect();
        presets.sort_by_key(|p| (p.bank, p.program));
        Ok(presets)
    }

    pub fn is_loaded(&self, path: impl AsRef<Path>) -> bool {
        self.fonts.contains_key(path.as_ref())
    }

    /// Drop a cached SoundFont. Programs already using it keep their copy.
    pub fn evict(&self, path: impl AsRef<Path>) -> bool {
        self.fonts.remove(path.as_ref()).is_some()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

impl std::fmt::Debug for SoundFontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundFontLibrary")
            .field("fonts", &self.fonts.len())
            .finish()
    }
}
