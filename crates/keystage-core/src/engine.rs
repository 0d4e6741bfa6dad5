//! The routing engine.
//!
//! [`Engine`] owns every port, route and synth slot behind one re-entrant
//! lock. Control-thread operations take the lock (blocking, off the deadline
//! path) for the duration of a structural change; [`Engine::process`] only ever
//! `try_lock`s it and skips the cycle when it is held.
//!
//! ```text
//!   control thread                          audio thread
//!   ──────────────                          ────────────
//!   let _p = engine.pause();   ─┐
//!   engine.add_midi_route(..)   │ lock held   engine.process(scope) -> false (skipped)
//!   engine.set_midi_route(..)   │
//!   drop(_p)                   ─┘            engine.process(scope) -> true
//! ```
//!
//! Lock order is always state, then server.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use keystage_midi::{MidiEvent, MidiFilter};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::callback::{process_cycle, CycleInputs};
use crate::config::EngineConfig;
use crate::handles::{AudioRouteId, MidiRouteId, PortId, SynthId};
use crate::lockfree::{AtomicFlag, AtomicSemitones};
use crate::notify::{Notification, NotificationReceiver};
use crate::offline::OfflineServer;
use crate::outbox::RouteOutbox;
use crate::panic::PanicState;
use crate::port::PortInfo;
use crate::registry::EngineState;
use crate::ringbuffer::{stash_buffer, BlockingRingBuffer, StashConsumer};
use crate::route::{AudioRouteInfo, AudioSource, MidiDestination, MidiRouteInfo};
use crate::server::{
    AudioServer, PortDirection, PortKind, ProcessScope, ServerCallbacks, ServerPortId,
};
use crate::synth::{SynthBridge, SynthHandle};
use crate::telemetry::{AudioRxEvent, MidiRxEvent};
use crate::{Error, Result};

/// Control-side end of the telemetry buffers.
struct Telemetry {
    midi_rx: StashConsumer<MidiRxEvent>,
    audio_rx: StashConsumer<AudioRxEvent>,
    midi_pending: Vec<MidiRxEvent>,
    audio_pending: Vec<AudioRxEvent>,
    /// Pending events kept per kind before the oldest are dropped.
    limit: usize,
}

impl Telemetry {
    /// Move committed events into the pending queues. Returns the new counts.
    fn drain(&mut self) -> (usize, usize) {
        let midi = self.midi_rx.read_into(&mut self.midi_pending);
        let audio = self.audio_rx.read_into(&mut self.audio_pending);
        trim_front(&mut self.midi_pending, self.limit);
        trim_front(&mut self.audio_pending, self.limit);
        (midi, audio)
    }
}

fn trim_front<T>(queue: &mut Vec<T>, limit: usize) {
    if queue.len() > limit {
        let excess = queue.len() - limit;
        queue.drain(..excess);
    }
}

/// Scoped pause of the process callback.
///
/// While any guard is alive, [`Engine::process`] skips its cycles. Guards
/// nest on the same thread; processing resumes when the last one drops.
#[must_use = "processing resumes as soon as the guard is dropped"]
pub struct PauseGuard<'a> {
    depth: &'a AtomicUsize,
    _guard: ReentrantMutexGuard<'a, RefCell<EngineState>>,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Real-time MIDI and audio routing engine.
pub struct Engine {
    config: EngineConfig,
    state: ReentrantMutex<RefCell<EngineState>>,
    /// Live pause guards.
    pause_depth: AtomicUsize,
    server: Mutex<Box<dyn AudioServer>>,
    bridge: Option<Arc<dyn SynthBridge>>,
    callbacks: Arc<ServerCallbacks>,
    outbox: RouteOutbox,
    telemetry: Mutex<Telemetry>,
    notifications: Arc<BlockingRingBuffer<Notification>>,
    panic_requested: AtomicFlag,
    panic_state: AtomicU8,
    transpose: AtomicSemitones,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Flags the audio server's callbacks should set. Callback-safe.
    pub fn callbacks(&self) -> Arc<ServerCallbacks> {
        Arc::clone(&self.callbacks)
    }

    /// A receiver for this engine's notifications.
    pub fn notifications(&self) -> NotificationReceiver {
        NotificationReceiver::new(Arc::clone(&self.notifications))
    }

    /// Pause the process callback until the returned guard is dropped.
    pub fn pause(&self) -> PauseGuard<'_> {
        let guard = self.state.lock();
        self.pause_depth.fetch_add(1, Ordering::AcqRel);
        PauseGuard {
            depth: &self.pause_depth,
            _guard: guard,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_depth.load(Ordering::Acquire) > 0
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    fn notify(&self, notification: Notification) {
        if !self.notifications.try_write(notification) {
            tracing::debug!("Notification queue full, dropping notification");
        }
    }

    /// Log a user-facing message and forward it to listeners.
    pub fn print(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.notify(Notification::Print(message));
    }

    // --- process -----------------------------------------------------------

    /// Run one process cycle. Call from the audio thread only.
    ///
    /// Returns false if the cycle was skipped because the engine is paused.
    /// Never blocks, allocates or logs.
    pub fn process(&self, scope: &mut dyn ProcessScope) -> bool {
        let Some(guard) = self.state.try_lock() else {
            return false;
        };
        if self.is_paused() {
            return false;
        }
        let Ok(mut state) = guard.try_borrow_mut() else {
            return false;
        };

        let inputs = CycleInputs {
            bridge: self.bridge.as_deref(),
            outbox: &self.outbox,
            transpose: self.transpose.get(),
            panic_requested: self.panic_requested.get(),
        };
        process_cycle(&mut state, &inputs, scope);
        self.panic_state
            .store(state.panic.as_u8(), Ordering::Release);
        true
    }

    // --- ports -------------------------------------------------------------

    fn add_port(&self, name: &str, kind: PortKind) -> Result<PortId> {
        let _pause = self.pause();
        let server_port = self
            .server
            .lock()
            .register_port(name, kind)
            .inspect_err(|e| tracing::warn!("Failed to register port '{}': {}", name, e))?;
        let id = self.with_state(|s| s.add_port(name, kind, server_port));
        tracing::debug!("Created {:?} port {}: {}", kind, id, name);
        Ok(id)
    }

    pub fn add_midi_port(&self, name: &str, direction: PortDirection) -> Result<PortId> {
        self.add_port(name, PortKind::midi(direction))
    }

    pub fn add_audio_port(&self, name: &str, direction: PortDirection) -> Result<PortId> {
        self.add_port(name, PortKind::audio(direction))
    }

    /// Remove a port. Routes that used it keep a `None` endpoint.
    pub fn remove_port(&self, id: PortId) -> Result<()> {
        let _pause = self.pause();
        let port = self.with_state(|s| s.remove_port(id))?;
        self.server
            .lock()
            .unregister_port(port.server_port)
            .inspect_err(|e| tracing::warn!("Failed to unregister port '{}': {}", port.name, e))?;
        tracing::debug!("Removed port {}: {}", id, port.name);
        Ok(())
    }

    /// Replace the filter on a MIDI input port.
    pub fn set_port_filter(&self, id: PortId, filter: MidiFilter) -> Result<()> {
        filter.validate()?;
        self.with_state(|s| {
            let port = s.port_of_kind(id, PortKind::MidiIn)?;
            port.filter = filter;
            port.bank.reset();
            Ok(())
        })
    }

    /// Set the gain of an audio port. Applies to inputs as they are read and
    /// to buses after mixing.
    pub fn set_port_gain(&self, id: PortId, gain: f32) -> Result<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(Error::InvalidConfig(format!("port gain {} is invalid", gain)));
        }
        self.with_state(|s| {
            s.audio_port_mut(id)?.gain = gain;
            Ok(())
        })
    }

    pub fn port_info(&self, id: PortId) -> Result<PortInfo> {
        self.with_state(|s| s.port(id).map(|p| p.info()))
    }

    pub fn server_port(&self, id: PortId) -> Result<ServerPortId> {
        self.with_state(|s| s.port(id).map(|p| p.server_port))
    }

    pub fn ports(&self) -> Vec<(PortId, PortInfo)> {
        self.with_state(|s| s.ports.iter().map(|(id, p)| (id, p.info())).collect())
    }

    // --- synths ------------------------------------------------------------

    /// Register a synth program (created through the bridge) so routes can
    /// target it. Its render buffers are allocated here.
    pub fn add_synth(&self, handle: SynthHandle) -> SynthId {
        let id = self.with_state(|s| s.add_synth(handle));
        tracing::debug!("Added synth slot {} for {:?}", id, handle);
        id
    }

    /// Remove a synth slot and return its bridge handle.
    pub fn remove_synth(&self, id: SynthId) -> Result<SynthHandle> {
        let slot = self.with_state(|s| s.remove_synth(id))?;
        tracing::debug!("Removed synth slot {}", id);
        Ok(slot.handle)
    }

    pub fn synths(&self) -> Vec<SynthId> {
        self.with_state(|s| s.synths.handles())
    }

    pub fn synth_handle(&self, id: SynthId) -> Result<SynthHandle> {
        self.with_state(|s| s.synths.get(id).map(|slot| slot.handle))
            .ok_or(Error::SynthNotFound)
    }

    // --- midi routes -------------------------------------------------------

    /// Create an inactive route with no endpoints.
    pub fn add_midi_route(&self) -> Result<MidiRouteId> {
        self.insert_midi_route(None, None)
    }

    /// Create an inactive route from a MIDI input to a MIDI output or synth.
    pub fn add_midi_route_between(
        &self,
        source: PortId,
        destination: MidiDestination,
    ) -> Result<MidiRouteId> {
        self.insert_midi_route(Some(source), Some(destination))
    }

    fn insert_midi_route(
        &self,
        source: Option<PortId>,
        destination: Option<MidiDestination>,
    ) -> Result<MidiRouteId> {
        // The outbox map is read by the process callback, so it only changes
        // while paused.
        let _pause = self.pause();
        let id = self
            .with_state(|s| s.add_midi_route(source, destination))
            .inspect_err(|e| tracing::warn!("Failed to create MIDI route: {}", e))?;
        self.outbox.register_route(id);
        tracing::debug!("Created MIDI route {}", id);
        Ok(id)
    }

    /// Retarget a MIDI route. Held notes are released on the new destination.
    pub fn set_midi_route(
        &self,
        id: MidiRouteId,
        source: Option<PortId>,
        destination: Option<MidiDestination>,
    ) -> Result<()> {
        self.with_state(|s| {
            s.check_midi_endpoints(source, destination)?;
            let route = s.midi_route_mut(id)?;
            route.source = source;
            route.destination = destination;
            Ok(())
        })
    }

    pub fn remove_midi_route(&self, id: MidiRouteId) -> Result<()> {
        let _pause = self.pause();
        self.with_state(|s| s.midi_routes.remove(id))
            .ok_or(Error::MidiRouteNotFound)?;
        self.outbox.unregister_route(id);
        tracing::debug!("Removed MIDI route {}", id);
        Ok(())
    }

    /// Deactivated routes stop passing new events but still release what
    /// they hold.
    pub fn set_midi_route_active(&self, id: MidiRouteId, active: bool) -> Result<()> {
        self.with_state(|s| {
            s.midi_route_mut(id)?.active = active;
            Ok(())
        })
    }

    pub fn set_midi_route_mute(&self, id: MidiRouteId, mute: bool) -> Result<()> {
        self.with_state(|s| {
            s.midi_route_mut(id)?.mute = mute;
            Ok(())
        })
    }

    pub fn set_midi_route_solo(&self, id: MidiRouteId, solo: bool) -> Result<()> {
        self.with_state(|s| {
            s.midi_route_mut(id)?.solo = solo;
            Ok(())
        })
    }

    pub fn set_route_midi_filter(&self, id: MidiRouteId, filter: MidiFilter) -> Result<()> {
        filter.validate()?;
        self.with_state(|s| {
            s.midi_route_mut(id)?.filter = filter;
            Ok(())
        })
    }

    pub fn midi_route_info(&self, id: MidiRouteId) -> Result<MidiRouteInfo> {
        self.with_state(|s| s.midi_route_mut(id).map(|r| r.info()))
    }

    pub fn midi_routes(&self) -> Vec<MidiRouteId> {
        self.with_state(|s| s.midi_routes.handles())
    }

    /// Queue events to go out on a route during the next cycle. They bypass
    /// the route filter and are dropped if the route is inactive by then.
    /// Returns how many fit in the route's queue.
    pub fn send_midi_events_on_route(&self, id: MidiRouteId, events: &[MidiEvent]) -> Result<usize> {
        let accepted = self
            .outbox
            .queue(id, events)
            .ok_or(Error::MidiRouteNotFound)?;
        if accepted < events.len() {
            tracing::debug!(
                "Route {} outbox full, dropped {} events",
                id,
                events.len() - accepted
            );
        }
        Ok(accepted)
    }

    // --- audio routes ------------------------------------------------------

    /// Create an inactive, silent route with no endpoints.
    pub fn add_audio_route(&self) -> Result<AudioRouteId> {
        self.insert_audio_route(None, None)
    }

    /// Create an inactive route from an audio input or synth side to a bus.
    pub fn add_audio_route_between(
        &self,
        source: AudioSource,
        destination: PortId,
    ) -> Result<AudioRouteId> {
        self.insert_audio_route(Some(source), Some(destination))
    }

    fn insert_audio_route(
        &self,
        source: Option<AudioSource>,
        destination: Option<PortId>,
    ) -> Result<AudioRouteId> {
        let id = self
            .with_state(|s| s.add_audio_route(source, destination))
            .inspect_err(|e| tracing::warn!("Failed to create audio route: {}", e))?;
        tracing::debug!("Created audio route {}", id);
        Ok(id)
    }

    pub fn set_audio_route(
        &self,
        id: AudioRouteId,
        source: Option<AudioSource>,
        destination: Option<PortId>,
    ) -> Result<()> {
        self.with_state(|s| {
            s.check_audio_endpoints(source, destination)?;
            let route = s.audio_route_mut(id)?;
            route.source = source;
            route.destination = destination;
            Ok(())
        })
    }

    pub fn remove_audio_route(&self, id: AudioRouteId) -> Result<()> {
        self.with_state(|s| s.audio_routes.remove(id))
            .ok_or(Error::AudioRouteNotFound)?;
        tracing::debug!("Removed audio route {}", id);
        Ok(())
    }

    /// Activation ramps in; deactivation ramps to silence.
    pub fn set_audio_route_active(&self, id: AudioRouteId, active: bool) -> Result<()> {
        self.with_state(|s| {
            s.audio_route_mut(id)?.active = active;
            Ok(())
        })
    }

    pub fn set_audio_route_mute(&self, id: AudioRouteId, mute: bool) -> Result<()> {
        self.with_state(|s| {
            s.audio_route_mut(id)?.mute = mute;
            Ok(())
        })
    }

    pub fn set_audio_route_solo(&self, id: AudioRouteId, solo: bool) -> Result<()> {
        self.with_state(|s| {
            s.audio_route_mut(id)?.solo = solo;
            Ok(())
        })
    }

    pub fn set_audio_route_gain(&self, id: AudioRouteId, gain: f32) -> Result<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(Error::InvalidConfig(format!("route gain {} is invalid", gain)));
        }
        self.with_state(|s| {
            s.audio_route_mut(id)?.gain = gain;
            Ok(())
        })
    }

    pub fn audio_route_info(&self, id: AudioRouteId) -> Result<AudioRouteInfo> {
        self.with_state(|s| s.audio_route_mut(id).map(|r| r.info()))
    }

    pub fn audio_routes(&self) -> Vec<AudioRouteId> {
        self.with_state(|s| s.audio_routes.handles())
    }

    // --- global state ------------------------------------------------------

    /// Request or clear panic. Takes effect on the next cycle.
    pub fn panic(&self, panic: bool) {
        if self.panic_requested.swap(panic) != panic {
            tracing::info!("Panic {}", if panic { "requested" } else { "cleared" });
        }
    }

    /// Panic state as of the last processed cycle.
    pub fn panic_state(&self) -> PanicState {
        PanicState::from_u8(self.panic_state.load(Ordering::Acquire))
    }

    /// Semitones added to every routed note-on. Notes already sounding are
    /// released at the pitch they started at.
    pub fn set_global_transpose(&self, semitones: i32) {
        self.transpose.set(semitones);
    }

    pub fn global_transpose(&self) -> i32 {
        self.transpose.get()
    }

    // --- telemetry ---------------------------------------------------------

    /// All MIDI telemetry received since the last call.
    pub fn take_midi_rx_events(&self) -> Vec<MidiRxEvent> {
        let mut telemetry = self.telemetry.lock();
        telemetry.drain();
        std::mem::take(&mut telemetry.midi_pending)
    }

    /// All audio level telemetry received since the last call.
    pub fn take_audio_rx_events(&self) -> Vec<AudioRxEvent> {
        let mut telemetry = self.telemetry.lock();
        telemetry.drain();
        std::mem::take(&mut telemetry.audio_pending)
    }

    /// Periodic control-side housekeeping. Drains telemetry, turns server
    /// callback flags into notifications and re-applies connections after
    /// the server's port set changed.
    pub fn on_timer(&self) {
        let (midi, audio) = self.telemetry.lock().drain();
        if midi > 0 {
            self.notify(Notification::MidiRxAvailable(midi));
        }
        if audio > 0 {
            self.notify(Notification::AudioRxAvailable(audio));
        }

        let xruns = self.callbacks.take_xruns();
        if xruns > 0 {
            tracing::debug!("{} xrun(s) reported", xruns);
            self.notify(Notification::Xrun);
        }

        let ports_changed = self.callbacks.take_ports_changed();
        let connections_changed = self.callbacks.take_connections_changed();
        if ports_changed || connections_changed {
            self.refresh_port_connections();
        }
        if ports_changed {
            self.notify(Notification::PortsChanged);
        }
    }

    // --- connections -------------------------------------------------------

    /// `(source, destination)` full names for a connection between one of
    /// our ports and a remote one.
    fn connection_pair(own: String, direction: PortDirection, remote: &str) -> (String, String) {
        match direction {
            PortDirection::Input => (remote.to_string(), own),
            PortDirection::Output => (own, remote.to_string()),
        }
    }

    /// Remember and make a connection between a port and a remote endpoint.
    /// The connection is kept even if the server refuses it now, and retried
    /// on [`refresh_port_connections`](Self::refresh_port_connections).
    ///
    /// Connection methods only hold the engine lock while they update the
    /// remembered connections, never while they talk to the server.
    pub fn add_port_connection(&self, id: PortId, remote: &str) -> Result<()> {
        let (server_port, direction) = self.with_state(|s| {
            let port = s.port_mut(id)?;
            if !port.connections.iter().any(|c| c == remote) {
                port.connections.push(remote.to_string());
            }
            Ok::<_, Error>((port.server_port, port.kind.direction()))
        })?;
        let mut server = self.server.lock();
        let own = server.port_name(server_port).ok_or(Error::PortNotFound)?;
        let (src, dst) = Self::connection_pair(own, direction, remote);
        server
            .connect(&src, &dst)
            .inspect_err(|e| tracing::warn!("Failed to connect {} -> {}: {}", src, dst, e))
    }

    pub fn remove_port_connection(&self, id: PortId, remote: &str) -> Result<()> {
        let (server_port, direction) = self.with_state(|s| {
            let port = s.port_mut(id)?;
            port.connections.retain(|c| c != remote);
            Ok::<_, Error>((port.server_port, port.kind.direction()))
        })?;
        let mut server = self.server.lock();
        let own = server.port_name(server_port).ok_or(Error::PortNotFound)?;
        let (src, dst) = Self::connection_pair(own, direction, remote);
        if let Err(e) = server.disconnect(&src, &dst) {
            tracing::debug!("Disconnect {} -> {}: {}", src, dst, e);
        }
        Ok(())
    }

    pub fn clear_port_connections(&self, id: PortId) -> Result<()> {
        let (server_port, direction, remotes) = self.with_state(|s| {
            let port = s.port_mut(id)?;
            Ok::<_, Error>((
                port.server_port,
                port.kind.direction(),
                std::mem::take(&mut port.connections),
            ))
        })?;
        let mut server = self.server.lock();
        let own = server.port_name(server_port).ok_or(Error::PortNotFound)?;
        for remote in &remotes {
            let (src, dst) = Self::connection_pair(own.clone(), direction, remote);
            if let Err(e) = server.disconnect(&src, &dst) {
                tracing::debug!("Disconnect {} -> {}: {}", src, dst, e);
            }
        }
        Ok(())
    }

    pub fn port_connections(&self, id: PortId) -> Result<Vec<String>> {
        self.with_state(|s| s.port(id).map(|p| p.connections.clone()))
    }

    /// Remember and make a connection between two ports of other clients.
    pub fn add_other_connection(&self, source: &str, destination: &str) -> Result<()> {
        self.with_state(|s| {
            let pair = (source.to_string(), destination.to_string());
            if !s.other_connections.contains(&pair) {
                s.other_connections.push(pair);
            }
        });
        self.server
            .lock()
            .connect(source, destination)
            .inspect_err(|e| {
                tracing::warn!("Failed to connect {} -> {}: {}", source, destination, e)
            })
    }

    pub fn remove_other_connection(&self, source: &str, destination: &str) -> Result<()> {
        self.with_state(|s| {
            s.other_connections
                .retain(|(src, dst)| !(src == source && dst == destination))
        });
        if let Err(e) = self.server.lock().disconnect(source, destination) {
            tracing::debug!("Disconnect {} -> {}: {}", source, destination, e);
        }
        Ok(())
    }

    pub fn clear_other_connections(&self) {
        let pairs = self.with_state(|s| std::mem::take(&mut s.other_connections));
        let mut server = self.server.lock();
        for (source, destination) in &pairs {
            if let Err(e) = server.disconnect(source, destination) {
                tracing::debug!("Disconnect {} -> {}: {}", source, destination, e);
            }
        }
    }

    pub fn other_connections(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.other_connections.clone())
    }

    /// Re-apply every remembered connection. Endpoints that do not exist
    /// (yet) are skipped. Returns how many connections are in place.
    pub fn refresh_port_connections(&self) -> usize {
        let (own_ports, mut pairs) = self.with_state(|s| {
            let own_ports: Vec<_> = s
                .ports
                .iter()
                .filter(|(_, port)| !port.connections.is_empty())
                .map(|(_, port)| (port.server_port, port.kind.direction(), port.connections.clone()))
                .collect();
            (own_ports, s.other_connections.clone())
        });

        let mut server = self.server.lock();
        for (server_port, direction, remotes) in own_ports {
            let Some(own) = server.port_name(server_port) else {
                continue;
            };
            pairs.extend(
                remotes
                    .iter()
                    .map(|remote| Self::connection_pair(own.clone(), direction, remote)),
            );
        }

        let mut connected = 0;
        for (src, dst) in &pairs {
            match server.connect(src, dst) {
                Ok(()) => connected += 1,
                Err(e) => tracing::debug!("Skipping {} -> {}: {}", src, dst, e),
            }
        }
        connected
    }

    /// Remote ports that a port of `kind` could connect to.
    pub fn remote_ports(&self, kind: PortKind) -> Vec<String> {
        self.server.lock().remote_ports(kind)
    }

    pub fn client_name(&self) -> String {
        self.server.lock().client_name().to_string()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("panic_state", &self.panic_state())
            .field("transpose", &self.global_transpose())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    server: Option<Box<dyn AudioServer>>,
    bridge: Option<Arc<dyn SynthBridge>>,
}

impl EngineBuilder {
    /// Start from a complete config.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    /// Sample rate used when no server is given. A supplied server's own
    /// rate takes precedence.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = rate;
        self
    }

    pub fn max_block_size(mut self, frames: usize) -> Self {
        self.config.max_block_size = frames;
        self
    }

    pub fn fade_secs(mut self, secs: f32) -> Self {
        self.config.fade_secs = secs;
        self
    }

    pub fn telemetry_capacity(mut self, capacity: usize) -> Self {
        self.config.telemetry_capacity = capacity;
        self
    }

    pub fn level_meter_cycles(mut self, cycles: u32) -> Self {
        self.config.level_meter_cycles = cycles;
        self
    }

    pub fn midi_events_per_port(mut self, events: usize) -> Self {
        self.config.midi_events_per_port = events;
        self
    }

    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.config.outbox_capacity = capacity;
        self
    }

    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.config.notification_capacity = capacity;
        self
    }

    pub fn timer_interval_ms(mut self, ms: u64) -> Self {
        self.config.timer_interval_ms = ms;
        self
    }

    /// Audio server to register ports with. Defaults to an [`OfflineServer`].
    pub fn server(mut self, server: impl AudioServer + 'static) -> Self {
        self.server = Some(Box::new(server));
        self
    }

    pub fn synth_bridge(mut self, bridge: Arc<dyn SynthBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let mut config = self.config;
        let mut server = match self.server {
            Some(server) => {
                config.sample_rate = server.sample_rate();
                server
            }
            None => Box::new(OfflineServer::new(
                config.client_name.clone(),
                config.sample_rate,
            )) as Box<dyn AudioServer>,
        };
        config
            .validate()
            .inspect_err(|e| tracing::warn!("Engine config rejected: {}", e))?;
        if !server.is_active() {
            tracing::warn!("Audio server client '{}' is not active", server.client_name());
            return Err(Error::ClientInactive);
        }

        let callbacks = Arc::new(ServerCallbacks::new());
        server.set_callbacks(Arc::clone(&callbacks));

        let (midi_tx, midi_rx) = stash_buffer(config.telemetry_capacity);
        let (audio_tx, audio_rx) = stash_buffer(config.telemetry_capacity);
        let state = EngineState::new(&config, midi_tx, audio_tx);

        tracing::info!(
            "Engine '{}' ready at {} Hz, fade {} samples",
            server.client_name(),
            config.sample_rate,
            config.fade_len()
        );

        Ok(Engine {
            state: ReentrantMutex::new(RefCell::new(state)),
            pause_depth: AtomicUsize::new(0),
            server: Mutex::new(server),
            bridge: self.bridge,
            callbacks,
            outbox: RouteOutbox::new(config.outbox_capacity),
            telemetry: Mutex::new(Telemetry {
                midi_rx,
                audio_rx,
                midi_pending: Vec::new(),
                audio_pending: Vec::new(),
                limit: config.telemetry_capacity,
            }),
            notifications: Arc::new(BlockingRingBuffer::new(config.notification_capacity)),
            panic_requested: AtomicFlag::new(false),
            panic_state: AtomicU8::new(PanicState::Idle.as_u8()),
            transpose: AtomicSemitones::new(0),
            config,
        })
    }
}
