//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Note-on records kept per MIDI route.
pub const NOTE_RECORDS_PER_ROUTE: usize = 128;

/// Configuration for the routing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Client name registered with the audio server.
    pub client_name: String,
    pub sample_rate: u32,
    /// Largest block the server may hand to the process callback.
    pub max_block_size: usize,
    /// Length of the route activation fade in seconds.
    pub fade_secs: f32,
    /// Capacity of each telemetry buffer (events per timer tick).
    pub telemetry_capacity: usize,
    /// Audio level is averaged over this many cycles before being reported.
    pub level_meter_cycles: u32,
    /// Raw MIDI events read per input port per cycle.
    pub midi_events_per_port: usize,
    /// Queued outgoing events per MIDI route.
    pub outbox_capacity: usize,
    pub notification_capacity: usize,
    pub timer_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client_name: "keystage".to_string(),
            sample_rate: 48000,
            max_block_size: 4096,
            fade_secs: 0.05,
            telemetry_capacity: 2048,
            level_meter_cycles: 8,
            midi_events_per_port: 1024,
            outbox_capacity: 256,
            notification_capacity: 256,
            timer_interval_ms: 20,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_name.is_empty() {
            return Err(Error::InvalidConfig("client_name is empty".into()));
        }
        if !(8000..=384000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.max_block_size == 0 || self.max_block_size > 65536 {
            return Err(Error::InvalidConfig(format!(
                "max_block_size {} out of range (1-65536)",
                self.max_block_size
            )));
        }
        if !(self.fade_secs.is_finite() && self.fade_secs > 0.0 && self.fade_secs <= 10.0) {
            return Err(Error::InvalidConfig(format!(
                "fade_secs {} out of range (0-10 s)",
                self.fade_secs
            )));
        }
        for (name, value) in [
            ("telemetry_capacity", self.telemetry_capacity),
            ("midi_events_per_port", self.midi_events_per_port),
            ("outbox_capacity", self.outbox_capacity),
            ("notification_capacity", self.notification_capacity),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }
        if self.level_meter_cycles == 0 {
            return Err(Error::InvalidConfig(
                "level_meter_cycles must be non-zero".into(),
            ));
        }
        if self.timer_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "timer_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Number of entries in the fade table (at least 2).
    pub fn fade_len(&self) -> usize {
        ((self.sample_rate as f64 * self.fade_secs as f64).round() as usize).max(2)
    }
}
