//! Keystage rig: the routing engine plus its embedded synth and timer.

use std::ops::Deref;
use std::sync::Arc;

use crate::core::{Engine, NotificationReceiver, TelemetryTimer};
use crate::Result;

#[cfg(feature = "soundfont")]
use std::path::Path;

#[cfg(feature = "soundfont")]
use crate::core::{
    AudioRouteId, AudioSource, MidiDestination, MidiRouteId, PortId, PortKind, StereoSide,
    SynthHandle, SynthId,
};
#[cfg(feature = "soundfont")]
use crate::synth::SoundFontBridge;

/// Routes and slot created for one SoundFont program.
#[cfg(feature = "soundfont")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoundFontLayer {
    pub handle: SynthHandle,
    pub synth: SynthId,
    pub midi_route: MidiRouteId,
    pub left_route: AudioRouteId,
    pub right_route: AudioRouteId,
}

/// What a half-built layer has created so far.
#[cfg(feature = "soundfont")]
#[derive(Default)]
struct LayerParts {
    midi_route: Option<MidiRouteId>,
    audio_routes: Vec<AudioRouteId>,
}

#[cfg(feature = "soundfont")]
impl LayerParts {
    fn discard(self, engine: &Engine, synth: SynthId) {
        let removed = self
            .midi_route
            .map_or(Ok(()), |id| engine.remove_midi_route(id))
            .and_then(|()| {
                self.audio_routes
                    .into_iter()
                    .try_for_each(|id| engine.remove_audio_route(id))
            })
            .and_then(|()| engine.remove_synth(synth).map(drop));
        if let Err(e) = removed {
            tracing::warn!("Failed to discard partial SoundFont layer: {}", e);
        }
    }
}

/// A running keystage rig.
///
/// Dereferences to the [`Engine`], so ports, routes, panic and transpose are
/// reached directly:
///
/// ```
/// use keystage::prelude::*;
///
/// let rig = Keystage::builder().timer(false).build()?;
/// let keys = rig.add_midi_port("keys", PortDirection::Input)?;
/// let out = rig.add_midi_port("to-sampler", PortDirection::Output)?;
/// let route = rig.add_midi_route_between(keys, MidiDestination::Port(out))?;
/// rig.set_midi_route_active(route, true)?;
/// rig.set_global_transpose(-12);
/// # Ok::<(), keystage::Error>(())
/// ```
pub struct Keystage {
    engine: Arc<Engine>,
    timer: Option<TelemetryTimer>,
    #[cfg(feature = "soundfont")]
    soundfont: Arc<SoundFontBridge>,
}

impl Keystage {
    pub fn builder() -> crate::KeystageBuilder {
        crate::KeystageBuilder::default()
    }

    pub(crate) fn from_parts(
        engine: Arc<Engine>,
        timer: Option<TelemetryTimer>,
        #[cfg(feature = "soundfont")] soundfont: Arc<SoundFontBridge>,
    ) -> Self {
        Self {
            engine,
            timer,
            #[cfg(feature = "soundfont")]
            soundfont,
        }
    }

    /// Shared handle to the engine, e.g. for the audio server's process callback.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn notifications(&self) -> NotificationReceiver {
        self.engine.notifications()
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Start the telemetry timer if it is not running.
    pub fn start_timer(&mut self) -> Result<()> {
        if self.timer.is_none() {
            self.timer = Some(TelemetryTimer::start(Arc::clone(&self.engine))?);
        }
        Ok(())
    }

    pub fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
    }

    #[cfg(feature = "soundfont")]
    pub fn soundfont(&self) -> &Arc<SoundFontBridge> {
        &self.soundfont
    }

    /// Load a SoundFont program and wire it up: MIDI from `midi_in` into the
    /// synth, its left and right outputs onto two buses. All three routes
    /// start active.
    #[cfg(feature = "soundfont")]
    pub fn add_soundfont_layer(
        &self,
        path: impl AsRef<Path>,
        bank: u16,
        program: u8,
        midi_in: PortId,
        buses: (PortId, PortId),
    ) -> Result<SoundFontLayer> {
        self.expect_kind(midi_in, PortKind::MidiIn)?;
        self.expect_kind(buses.0, PortKind::AudioOut)?;
        self.expect_kind(buses.1, PortKind::AudioOut)?;

        let handle = self.soundfont.add_program(path, bank, program)?;
        match self.wire_layer(handle, midi_in, buses) {
            Ok(layer) => {
                tracing::debug!("Added SoundFont layer {:?}", layer);
                Ok(layer)
            }
            Err(e) => {
                if let Err(cleanup) = self.soundfont.remove_program(handle) {
                    tracing::warn!("Failed to remove program {:?}: {}", handle, cleanup);
                }
                Err(e)
            }
        }
    }

    #[cfg(feature = "soundfont")]
    fn expect_kind(&self, port: PortId, expected: PortKind) -> Result<()> {
        let found = self.engine.port_info(port)?.kind;
        if found != expected {
            return Err(keystage_core::Error::WrongPortKind { expected, found }.into());
        }
        Ok(())
    }

    /// Register the synth slot and its three routes. On failure everything
    /// created so far is removed again.
    #[cfg(feature = "soundfont")]
    fn wire_layer(
        &self,
        handle: SynthHandle,
        midi_in: PortId,
        buses: (PortId, PortId),
    ) -> Result<SoundFontLayer> {
        let engine = &self.engine;
        let _pause = engine.pause();

        let synth = engine.add_synth(handle);
        let mut parts = LayerParts::default();
        match Self::fill_layer(engine, handle, synth, midi_in, buses, &mut parts) {
            Ok(layer) => Ok(layer),
            Err(e) => {
                parts.discard(engine, synth);
                Err(e)
            }
        }
    }

    #[cfg(feature = "soundfont")]
    fn fill_layer(
        engine: &Engine,
        handle: SynthHandle,
        synth: SynthId,
        midi_in: PortId,
        (left_bus, right_bus): (PortId, PortId),
        parts: &mut LayerParts,
    ) -> Result<SoundFontLayer> {
        let side = |side| AudioSource::Synth { synth, side };

        let midi_route = engine.add_midi_route_between(midi_in, MidiDestination::Synth(synth))?;
        parts.midi_route = Some(midi_route);
        let left_route = engine.add_audio_route_between(side(StereoSide::Left), left_bus)?;
        parts.audio_routes.push(left_route);
        let right_route = engine.add_audio_route_between(side(StereoSide::Right), right_bus)?;
        parts.audio_routes.push(right_route);

        engine.set_midi_route_active(midi_route, true)?;
        engine.set_audio_route_active(left_route, true)?;
        engine.set_audio_route_active(right_route, true)?;

        Ok(SoundFontLayer {
            handle,
            synth,
            midi_route,
            left_route,
            right_route,
        })
    }

    /// Remove a layer's routes and synth slot, then its program.
    #[cfg(feature = "soundfont")]
    pub fn remove_soundfont_layer(&self, layer: &SoundFontLayer) -> Result<()> {
        {
            let _pause = self.engine.pause();
            self.engine.remove_midi_route(layer.midi_route)?;
            self.engine.remove_audio_route(layer.left_route)?;
            self.engine.remove_audio_route(layer.right_route)?;
            self.engine.remove_synth(layer.synth)?;
        }
        self.soundfont.remove_program(layer.handle)?;
        tracing::debug!("Removed SoundFont layer {:?}", layer);
        Ok(())
    }

    /// Set the synthesizer volume of a layer.
    #[cfg(feature = "soundfont")]
    pub fn set_soundfont_layer_gain(&self, layer: &SoundFontLayer, gain: f32) -> Result<()> {
        Ok(self.soundfont.set_gain(layer.handle, gain)?)
    }
}

impl Deref for Keystage {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl std::fmt::Debug for Keystage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystage")
            .field("engine", &self.engine)
            .field("timer", &self.timer.is_some())
            .finish_non_exhaustive()
    }
}
