//! Periodic telemetry drain on a control-side thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use crate::engine::Engine;
use crate::Result;

/// Calls [`Engine::on_timer`] at a fixed interval until dropped.
pub struct TelemetryTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TelemetryTimer {
    /// Start a timer using the engine's configured interval.
    pub fn start(engine: Arc<Engine>) -> Result<Self> {
        let interval = Duration::from_millis(engine.config().timer_interval_ms);
        Self::spawn(engine, interval)
    }

    pub fn spawn(engine: Arc<Engine>, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("keystage-timer".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => engine.on_timer(),
                        recv(stop_rx) -> _ => break,
                    }
                }
                tracing::debug!("Telemetry timer stopped");
            })?;
        tracing::debug!("Telemetry timer started ({:?})", interval);
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the select.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Telemetry timer thread panicked");
            }
        }
    }
}

impl Drop for TelemetryTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TelemetryTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryTimer")
            .field("running", &self.handle.is_some())
            .finish()
    }
}
