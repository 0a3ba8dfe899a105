//! # Playback Engine
//!
//! Single owner of "what is playing and where". The engine drives one local
//! [`AudioOutput`] and, when a cast receiver is connected, one remote output.
//!
//! ## Sessions
//!
//! Every load sent to an output carries a fresh [`PlaybackSessionId`]. Output
//! events are applied only when they come from the active output *and* echo
//! the current session; anything else belongs to a superseded load and is
//! dropped. This is what keeps a slow backend from resurrecting a station the
//! user already moved away from.
//!
//! ## Concurrency
//!
//! Engine bookkeeping lives behind one `parking_lot` mutex that is never held
//! across an `.await`. Commands that talk to outputs are serialized through an
//! async command lock so backends observe them in order. `play` marks the new
//! session before it waits for that lock, which makes it supersede any command
//! or event still in flight.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::playback::{
    AudioOutput, MediaLoad, OutputEvent, OutputEventKind, OutputKind, PlaybackSessionId,
};
use core_library::models::Station;
use core_library::store::HistoryFavoritesStore;
use core_runtime::config::PlaybackSettings;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{PlaybackError, Result};
use crate::state::{FocusChange, PlaybackState};

/// Something the sleep timer can pause.
#[async_trait]
pub trait PauseTarget: Send + Sync {
    async fn pause(&self) -> Result<()>;
}

/// Receives remote-route edges from the cast bridge.
#[async_trait]
pub trait RemoteRouteListener: Send + Sync {
    async fn remote_available(&self);
    async fn remote_unavailable(&self);
}

/// Media currently owned by the engine.
struct CurrentMedia {
    station: Station,
    /// History was written for this play request.
    recorded: bool,
}

struct EngineCore {
    state: PlaybackState,
    active: OutputKind,
    session: Option<PlaybackSessionId>,
    media: Option<CurrentMedia>,
    /// Output that currently has media loaded and must be stopped on teardown.
    loaded_on: Option<OutputKind>,
    volume: f32,
    ducked: bool,
    paused_by_focus: bool,
    /// Pause requested while loading; applied once the output starts.
    pause_pending: bool,
}

enum EventAction {
    Record(Station),
    Pause,
    Fault(String),
}

struct EngineInner {
    local: Arc<dyn AudioOutput>,
    remote: Option<Arc<dyn AudioOutput>>,
    store: Arc<dyn HistoryFavoritesStore>,
    events: EventBus,
    settings: PlaybackSettings,
    state_tx: watch::Sender<PlaybackState>,
    core: Mutex<EngineCore>,
    commands: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

/// Playback state machine.
///
/// Cloning is cheap and yields another handle to the same engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    /// Create an engine and start listening to its outputs.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        local: Arc<dyn AudioOutput>,
        remote: Option<Arc<dyn AudioOutput>>,
        store: Arc<dyn HistoryFavoritesStore>,
        events: EventBus,
        settings: PlaybackSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        let inner = Arc::new(EngineInner {
            local,
            remote,
            store,
            events,
            settings,
            state_tx,
            core: Mutex::new(EngineCore {
                state: PlaybackState::Idle,
                active: OutputKind::Local,
                session: None,
                media: None,
                loaded_on: None,
                volume: 1.0,
                ducked: false,
                paused_by_focus: false,
                pause_pending: false,
            }),
            commands: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
        });

        spawn_event_pump(&inner, OutputKind::Local, inner.local.clone());
        if let Some(remote) = inner.remote.clone() {
            spawn_event_pump(&inner, OutputKind::Remote, remote);
        }

        Self { inner }
    }

    /// Current state snapshot.
    pub fn state(&self) -> PlaybackState {
        self.inner.core.lock().state.clone()
    }

    /// Observe state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state_tx.subscribe()
    }

    /// Station loaded into an output; `None` when idle or failed.
    pub fn current_station(&self) -> Option<Station> {
        self.inner.core.lock().state.station().cloned()
    }

    pub fn active_output(&self) -> OutputKind {
        self.inner.core.lock().active
    }

    pub fn has_remote_output(&self) -> bool {
        self.inner.remote.is_some()
    }

    /// Start playing `station` on the active output.
    ///
    /// Playing the station that is already loading or playing is a no-op;
    /// playing the paused station resumes it.
    #[instrument(skip(self, station), fields(station_id = %station.id))]
    pub async fn play(&self, station: Station) -> Result<()> {
        station
            .validate()
            .map_err(PlaybackError::InvalidStation)?;

        let session = {
            let mut core = self.inner.core.lock();
            let same_station = core.state.station() == Some(&station);
            if same_station && core.state.wants_audio() {
                debug!("Station already active");
                core.pause_pending = false;
                return Ok(());
            }
            if same_station {
                None
            } else {
                let session = PlaybackSessionId::new();
                core.session = Some(session);
                core.media = Some(CurrentMedia {
                    station: station.clone(),
                    recorded: false,
                });
                core.paused_by_focus = false;
                core.pause_pending = false;
                self.inner
                    .set_state(&mut core, PlaybackState::Loading(station.clone()));
                Some(session)
            }
        };

        let Some(session) = session else {
            return self.resume().await;
        };

        let _queue = self.inner.commands.lock().await;

        let (target, previous) = {
            let mut core = self.inner.core.lock();
            if core.session != Some(session) {
                debug!(%session, "Load superseded before it reached the output");
                return Ok(());
            }
            let previous = core.loaded_on.take();
            core.loaded_on = Some(core.active);
            (core.active, previous)
        };

        if let Some(kind) = previous {
            self.inner.stop_output(kind).await;
        }

        let output = self.inner.output(target)?;
        info!(%session, output = %target, "Loading {}", station.name);
        let request = MediaLoad {
            session,
            stream_url: station.stream_url.clone(),
            station_id: station.id.clone(),
            start_position: Duration::ZERO,
            play_when_ready: true,
        };
        if let Err(e) = output.load_and_play(request).await {
            self.inner.fault(session, e.to_string()).await;
        }

        Ok(())
    }

    /// Pause playback.
    ///
    /// While loading, the pause is held back and applied as soon as the output
    /// reports that playback started. In any other state besides playing this
    /// is a no-op.
    pub async fn pause(&self) -> Result<()> {
        let _queue = self.inner.commands.lock().await;
        self.inner.pause_locked(None).await
    }

    /// Resume the paused station.
    pub async fn resume(&self) -> Result<()> {
        let _queue = self.inner.commands.lock().await;
        self.inner.resume_locked().await
    }

    /// Stop playback and return to idle.
    pub async fn stop(&self) -> Result<()> {
        let _queue = self.inner.commands.lock().await;

        let (loaded, station_id) = {
            let mut core = self.inner.core.lock();
            if matches!(core.state, PlaybackState::Idle) && core.loaded_on.is_none() {
                return Ok(());
            }
            core.session = None;
            core.paused_by_focus = false;
            core.pause_pending = false;
            let station_id = core.media.take().map(|m| m.station.id);
            let loaded = core.loaded_on.take();
            self.inner.set_state(&mut core, PlaybackState::Idle);
            (loaded, station_id)
        };

        if let Some(kind) = loaded {
            self.inner.stop_output(kind).await;
        }
        info!("Playback stopped");
        self.inner
            .emit(PlaybackEvent::Stopped { station_id });
        Ok(())
    }

    /// Set the output volume in `0.0..=1.0`.
    ///
    /// While ducked the new level is remembered and applied on focus gain.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }

        let _queue = self.inner.commands.lock().await;
        let (active, ducked) = {
            let mut core = self.inner.core.lock();
            core.volume = volume;
            (core.active, core.ducked)
        };
        if ducked {
            return Ok(());
        }
        self.inner.output(active)?.set_volume(volume).await?;
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.inner.core.lock().volume
    }

    /// React to an audio focus change delivered by the host.
    #[instrument(skip(self))]
    pub async fn on_focus_change(&self, change: FocusChange) -> Result<()> {
        let _queue = self.inner.commands.lock().await;

        match change {
            FocusChange::Loss => {
                self.inner.core.lock().paused_by_focus = false;
                self.inner.pause_locked(None).await
            }
            FocusChange::LossTransient => {
                let was_playing = self.inner.core.lock().state.wants_audio();
                self.inner.pause_locked(None).await?;
                if was_playing {
                    self.inner.core.lock().paused_by_focus = true;
                }
                Ok(())
            }
            FocusChange::LossTransientCanDuck => {
                let active = {
                    let mut core = self.inner.core.lock();
                    if core.ducked {
                        return Ok(());
                    }
                    core.ducked = true;
                    core.active
                };
                let level = self.inner.settings.duck_volume;
                debug!(level, "Ducking output");
                self.inner.output(active)?.set_volume(level).await?;
                Ok(())
            }
            FocusChange::Gain => {
                let (active, restore, resume) = {
                    let mut core = self.inner.core.lock();
                    let restore = std::mem::replace(&mut core.ducked, false).then_some(core.volume);
                    let resume = std::mem::replace(&mut core.paused_by_focus, false)
                        && self.inner.settings.resume_on_focus_gain;
                    (core.active, restore, resume)
                };
                if let Some(volume) = restore {
                    self.inner.output(active)?.set_volume(volume).await?;
                }
                if resume {
                    debug!("Resuming after transient focus loss");
                    self.inner.resume_locked().await?;
                }
                Ok(())
            }
        }
    }

    /// Move playback to `target`, carrying over the position and the
    /// playing/paused intent.
    ///
    /// With nothing loaded this only changes which output the next `play`
    /// uses.
    #[instrument(skip(self))]
    pub async fn switch_output(&self, target: OutputKind) -> Result<()> {
        let target_output = self.inner.output(target)?;
        let _queue = self.inner.commands.lock().await;

        let (source, loaded, captured_session, station, was_playing, pause_pending) = {
            let mut core = self.inner.core.lock();
            if core.active == target {
                return Ok(());
            }
            let source = core.active;
            core.active = target;
            let pause_pending = std::mem::take(&mut core.pause_pending);
            (
                source,
                core.loaded_on.take(),
                core.session,
                core.media.as_ref().map(|m| m.station.clone()),
                core.state.wants_audio() && !pause_pending,
                pause_pending,
            )
        };

        info!(from = %source, to = %target, "Switching audio output");
        self.inner.emit(PlaybackEvent::OutputSwitched {
            target: target.to_string(),
        });

        let mut position = Duration::ZERO;
        if let Some(kind) = loaded {
            if let Ok(output) = self.inner.output(kind) {
                position = output.position().await.unwrap_or_else(|e| {
                    debug!(error = %e, "Position unavailable, restarting from zero");
                    Duration::ZERO
                });
            }
            self.inner.stop_output(kind).await;
        }
        self.inner.carry_volume(source, target).await;

        let Some(station) = station else {
            return Ok(());
        };

        let session = {
            let mut core = self.inner.core.lock();
            if core.session != captured_session || captured_session.is_none() {
                // A newer play() is waiting for the queue and will load on `target`.
                return Ok(());
            }
            let session = PlaybackSessionId::new();
            core.session = Some(session);
            core.loaded_on = Some(target);
            if was_playing {
                self.inner
                    .set_state(&mut core, PlaybackState::Loading(station.clone()));
            } else if pause_pending {
                self.inner
                    .set_state(&mut core, PlaybackState::Paused(station.clone()));
                self.inner.emit(PlaybackEvent::Paused {
                    station_id: station.id.clone(),
                });
            }
            session
        };

        debug!(%session, ?position, was_playing, "Handing media to {}", target);
        let request = MediaLoad {
            session,
            stream_url: station.stream_url.clone(),
            station_id: station.id.clone(),
            start_position: position,
            play_when_ready: was_playing,
        };
        if let Err(e) = target_output.load_and_play(request).await {
            self.inner.fault(session, e.to_string()).await;
        }
        Ok(())
    }

    /// Play the station an alarm points at.
    pub async fn on_alarm_fired(&self, station_id: &str) -> Result<()> {
        let station = self
            .inner
            .store
            .station(station_id)
            .await?
            .ok_or_else(|| PlaybackError::StationNotFound(station_id.to_string()))?;
        info!(station_id, "Alarm fired, starting playback");
        self.play(station).await
    }

    /// Stop listening to outputs and release them.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let _queue = self.inner.commands.lock().await;

        let loaded = {
            let mut core = self.inner.core.lock();
            core.session = None;
            core.media = None;
            core.pause_pending = false;
            self.inner.set_state(&mut core, PlaybackState::Idle);
            core.loaded_on.take()
        };
        if let Some(kind) = loaded {
            self.inner.stop_output(kind).await;
        }

        let outputs = std::iter::once(&self.inner.local).chain(self.inner.remote.as_ref());
        for output in outputs {
            if let Err(e) = output.release().await {
                warn!(output = %output.kind(), error = %e, "Failed to release output");
            }
        }
        info!("Playback engine shut down");
    }
}

#[async_trait]
impl PauseTarget for PlaybackEngine {
    async fn pause(&self) -> Result<()> {
        PlaybackEngine::pause(self).await
    }
}

#[async_trait]
impl RemoteRouteListener for PlaybackEngine {
    async fn remote_available(&self) {
        if !self.has_remote_output() {
            debug!("Cast device connected but no remote output is attached");
            return;
        }
        if let Err(e) = self.switch_output(OutputKind::Remote).await {
            warn!(error = %e, "Failed to move playback to cast device");
        }
    }

    async fn remote_unavailable(&self) {
        if let Err(e) = self.switch_output(OutputKind::Local).await {
            warn!(error = %e, "Failed to move playback back to local output");
        }
    }
}

impl EngineInner {
    fn output(&self, kind: OutputKind) -> Result<Arc<dyn AudioOutput>> {
        match kind {
            OutputKind::Local => Ok(self.local.clone()),
            OutputKind::Remote => self
                .remote
                .clone()
                .ok_or(PlaybackError::OutputUnavailable(OutputKind::Remote)),
        }
    }

    fn set_state(&self, core: &mut EngineCore, state: PlaybackState) {
        trace!(from = core.state.name(), to = state.name(), "State transition");
        core.state = state.clone();
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.emit(CoreEvent::Playback(event));
    }

    async fn stop_output(&self, kind: OutputKind) {
        let Ok(output) = self.output(kind) else {
            return;
        };
        if let Err(e) = output.stop().await {
            warn!(output = %kind, error = %e, "Failed to stop output");
        }
    }

    /// Match the target's volume to the engine and undo any duck left on
    /// the source.
    async fn carry_volume(&self, source: OutputKind, target: OutputKind) {
        let (volume, ducked) = {
            let core = self.core.lock();
            (core.volume, core.ducked)
        };
        let level = if ducked { self.settings.duck_volume } else { volume };

        if ducked {
            if let Ok(output) = self.output(source) {
                if let Err(e) = output.set_volume(volume).await {
                    debug!(output = %source, error = %e, "Could not restore volume");
                }
            }
        }
        if let Ok(output) = self.output(target) {
            if let Err(e) = output.set_volume(level).await {
                warn!(output = %target, error = %e, "Failed to apply volume after switch");
            }
        }
    }

    /// Pause the active output, then record it. Caller holds the command lock.
    ///
    /// With `expected` set, only the given session is paused.
    async fn pause_locked(&self, expected: Option<PlaybackSessionId>) -> Result<()> {
        let (active, session, station) = {
            let mut core = self.core.lock();
            if expected.is_some() && core.session != expected {
                return Ok(());
            }
            match core.state.clone() {
                PlaybackState::Playing(station) => (core.active, core.session, station),
                PlaybackState::Loading(_) => {
                    debug!("Pause deferred until the output starts");
                    core.pause_pending = true;
                    return Ok(());
                }
                state => {
                    trace!(state = state.name(), "Pause ignored");
                    return Ok(());
                }
            }
        };

        self.output(active)?.pause().await?;

        {
            let mut core = self.core.lock();
            // The backend may have reported the pause itself, or a new load
            // may have started meanwhile.
            if core.session != session || core.state != PlaybackState::Playing(station.clone()) {
                return Ok(());
            }
            self.set_state(&mut core, PlaybackState::Paused(station.clone()));
        }
        info!(station_id = %station.id, "Playback paused");
        self.emit(PlaybackEvent::Paused {
            station_id: station.id,
        });
        Ok(())
    }

    /// Resume the active output, then record it. Caller holds the command
    /// lock.
    ///
    /// A pause still waiting for the output to start is dropped instead.
    async fn resume_locked(&self) -> Result<()> {
        let (active, session, station) = {
            let mut core = self.core.lock();
            match core.state.clone() {
                PlaybackState::Paused(station) => (core.active, core.session, station),
                PlaybackState::Loading(_) if core.pause_pending => {
                    debug!("Deferred pause withdrawn");
                    core.pause_pending = false;
                    core.paused_by_focus = false;
                    return Ok(());
                }
                state => {
                    trace!(state = state.name(), "Resume ignored");
                    return Ok(());
                }
            }
        };

        self.output(active)?.resume().await?;

        {
            let mut core = self.core.lock();
            if core.session != session {
                return Ok(());
            }
            core.paused_by_focus = false;
            if core.state != PlaybackState::Paused(station.clone()) {
                return Ok(());
            }
            self.set_state(&mut core, PlaybackState::Playing(station.clone()));
        }
        info!(station_id = %station.id, "Playback resumed");
        self.emit(PlaybackEvent::Resumed {
            station_id: station.id,
        });
        Ok(())
    }

    /// Tear down after a backend failure. Caller holds the command lock.
    async fn fault(&self, session: PlaybackSessionId, message: String) {
        let (station, loaded) = {
            let mut core = self.core.lock();
            if core.session != Some(session) {
                return;
            }
            core.session = None;
            core.paused_by_focus = false;
            core.pause_pending = false;
            (core.media.take().map(|m| m.station), core.loaded_on.take())
        };

        warn!(%session, error = %message, "Playback failed");
        if let Some(kind) = loaded {
            self.stop_output(kind).await;
        }

        let station_id = station.as_ref().map(|s| s.id.clone());
        {
            let mut core = self.core.lock();
            // play() may have started a new session while the output stopped.
            if core.session.is_none() {
                self.set_state(
                    &mut core,
                    PlaybackState::Error {
                        station,
                        message: message.clone(),
                    },
                );
            }
        }
        self.emit(PlaybackEvent::Error {
            station_id,
            message,
        });
    }

    async fn handle_output_event(&self, from: OutputKind, event: OutputEvent) {
        let mut actions = Vec::new();
        {
            let mut core = self.core.lock();
            if core.active != from || core.session != Some(event.session) {
                trace!(output = %from, session = %event.session, kind = ?event.kind, "Dropping stale output event");
                return;
            }

            match event.kind {
                OutputEventKind::Ready => {
                    debug!(session = %event.session, "Output ready");
                }
                OutputEventKind::PlaybackStarted => match core.state.clone() {
                    PlaybackState::Loading(station) => {
                        self.set_state(&mut core, PlaybackState::Playing(station.clone()));
                        let first_start = core
                            .media
                            .as_mut()
                            .map(|m| !std::mem::replace(&mut m.recorded, true))
                            .unwrap_or(false);
                        if first_start {
                            info!(station_id = %station.id, "Playback started");
                            self.emit(PlaybackEvent::Started {
                                station_id: station.id.clone(),
                                name: station.name.clone(),
                            });
                            actions.push(EventAction::Record(station));
                        }
                        if std::mem::take(&mut core.pause_pending) {
                            debug!(session = %event.session, "Applying deferred pause");
                            actions.push(EventAction::Pause);
                        }
                    }
                    PlaybackState::Paused(station) => {
                        let station_id = station.id.clone();
                        self.set_state(&mut core, PlaybackState::Playing(station));
                        self.emit(PlaybackEvent::Resumed { station_id });
                    }
                    _ => {}
                },
                OutputEventKind::PlaybackPaused => {
                    if let PlaybackState::Playing(station) = core.state.clone() {
                        let station_id = station.id.clone();
                        self.set_state(&mut core, PlaybackState::Paused(station));
                        self.emit(PlaybackEvent::Paused { station_id });
                    }
                }
                OutputEventKind::Ended => {
                    core.session = None;
                    core.loaded_on = None;
                    core.paused_by_focus = false;
                    core.pause_pending = false;
                    let station_id = core.media.take().map(|m| m.station.id);
                    self.set_state(&mut core, PlaybackState::Idle);
                    info!("Stream ended");
                    self.emit(PlaybackEvent::Stopped { station_id });
                }
                OutputEventKind::Error(message) => actions.push(EventAction::Fault(message)),
            }
        }

        for action in actions {
            match action {
                EventAction::Record(station) => {
                    if let Err(e) = self.store.record_play(&station).await {
                        warn!(station_id = %station.id, error = %e, "Failed to record play history");
                    }
                }
                EventAction::Pause => {
                    let _queue = self.commands.lock().await;
                    if let Err(e) = self.pause_locked(Some(event.session)).await {
                        warn!(session = %event.session, error = %e, "Deferred pause failed");
                    }
                }
                EventAction::Fault(message) => {
                    let _queue = self.commands.lock().await;
                    self.fault(event.session, message).await;
                }
            }
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Forward `output`'s events into the engine until shutdown.
///
/// The pump holds a weak reference so dropping the last engine handle ends it.
fn spawn_event_pump(inner: &Arc<EngineInner>, kind: OutputKind, output: Arc<dyn AudioOutput>) {
    let mut events = output.events();
    let engine: Weak<EngineInner> = Arc::downgrade(inner);
    let shutdown = inner.shutdown.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = events.next() => {
                    let Some(event) = next else {
                        debug!(output = %kind, "Output event stream closed");
                        break;
                    };
                    let Some(engine) = engine.upgrade() else { break };
                    engine.handle_output_event(kind, event).await;
                }
            }
        }
        trace!(output = %kind, "Event pump stopped");
    });
}
