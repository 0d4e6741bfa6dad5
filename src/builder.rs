//! Builder for configuring and constructing a `Keystage` rig.

use std::sync::Arc;

use crate::core::{AudioServer, EngineBuilder, EngineConfig, TelemetryTimer};
use crate::{Keystage, Result};

/// The embedded SoundFont synth (feature `soundfont`) is created automatically
/// at the engine's sample rate. The telemetry timer is started unless
/// disabled with `.timer(false)`.
///
/// Without `.server(..)` the engine runs on an in-memory
/// [`OfflineServer`](crate::core::OfflineServer).
///
/// # Example
///
/// ```
/// use keystage::prelude::*;
///
/// let rig = Keystage::builder()
///     .client_name("stage")
///     .fade_secs(0.02)
///     .timer(false)
///     .build()?;
///
/// let keys = rig.add_midi_port("keys", PortDirection::Input)?;
/// # let _ = keys;
/// # Ok::<(), keystage::Error>(())
/// ```
pub struct KeystageBuilder {
    engine: EngineBuilder,
    /// Rate of the explicit server, which wins over the configured one.
    server_rate: Option<u32>,
    config_rate: u32,
    timer: bool,
}

impl Default for KeystageBuilder {
    fn default() -> Self {
        Self {
            engine: EngineBuilder::default(),
            server_rate: None,
            config_rate: EngineConfig::default().sample_rate,
            timer: true,
        }
    }
}

impl KeystageBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config_rate = config.sample_rate;
        self.engine = self.engine.config(config);
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.engine = self.engine.client_name(name);
        self
    }

    /// Ignored when a server is supplied; the server's rate is used instead.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config_rate = rate;
        self.engine = self.engine.sample_rate(rate);
        self
    }

    pub fn max_block_size(mut self, frames: usize) -> Self {
        self.engine = self.engine.max_block_size(frames);
        self
    }

    pub fn fade_secs(mut self, secs: f32) -> Self {
        self.engine = self.engine.fade_secs(secs);
        self
    }

    pub fn timer_interval_ms(mut self, ms: u64) -> Self {
        self.engine = self.engine.timer_interval_ms(ms);
        self
    }

    pub fn server(mut self, server: impl AudioServer + 'static) -> Self {
        self.server_rate = Some(server.sample_rate());
        self.engine = self.engine.server(server);
        self
    }

    /// Default: true
    pub fn timer(mut self, enabled: bool) -> Self {
        self.timer = enabled;
        self
    }

    pub fn build(self) -> Result<Keystage> {
        #[allow(unused_mut)]
        let mut engine = self.engine;

        #[cfg(feature = "soundfont")]
        let soundfont = {
            let rate = self.server_rate.unwrap_or(self.config_rate);
            let bridge = Arc::new(crate::synth::SoundFontBridge::new(rate)?);
            engine = engine.synth_bridge(bridge.clone());
            bridge
        };
        #[cfg(not(feature = "soundfont"))]
        let _ = (self.server_rate, self.config_rate);

        let engine = Arc::new(engine.build()?);
        let timer = if self.timer {
            Some(TelemetryTimer::start(Arc::clone(&engine))?)
        } else {
            None
        };

        tracing::info!(
            "keystage ready: client '{}', {} Hz",
            engine.client_name(),
            engine.config().sample_rate
        );

        Ok(Keystage::from_parts(
            engine,
            timer,
            #[cfg(feature = "soundfont")]
            soundfont,
        ))
    }
}
