#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::playback::{
    AudioOutput, MediaLoad, OutputEvent, OutputEventKind, OutputKind, PlaybackSessionId,
};
use core_library::{HistoryEntry, HistoryFavoritesStore, LibraryError, Station};
use core_playback::{PlaybackEngine, PlaybackState};
use core_runtime::config::PlaybackSettings;
use core_runtime::events::EventBus;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(MediaLoad),
    Pause,
    Resume,
    Stop,
    Release,
    Volume(f32),
}

/// Scripted output: records commands, emits only what the test tells it to.
pub struct FakeOutput {
    kind: OutputKind,
    events: broadcast::Sender<OutputEvent>,
    calls: Mutex<Vec<Call>>,
    position: Mutex<Duration>,
    fail_loads: AtomicBool,
    fail_controls: AtomicBool,
}

impl FakeOutput {
    pub fn new(kind: OutputKind) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            kind,
            events,
            calls: Mutex::new(Vec::new()),
            position: Mutex::new(Duration::ZERO),
            fail_loads: AtomicBool::new(false),
            fail_controls: AtomicBool::new(false),
        })
    }

    pub fn emit(&self, session: PlaybackSessionId, kind: OutputEventKind) {
        let _ = self.events.send(OutputEvent::new(session, kind));
    }

    /// Report an event for the most recent load.
    pub fn emit_current(&self, kind: OutputEventKind) {
        let session = self.last_load().expect("no load issued").session;
        self.emit(session, kind);
    }

    pub fn set_position(&self, position: Duration) {
        *self.position.lock() = position;
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }

    /// Make `pause` and `resume` fail from now on.
    pub fn fail_controls(&self) {
        self.fail_controls.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn loads(&self) -> Vec<MediaLoad> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Load(load) => Some(load.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Volume(level) => Some(*level),
                _ => None,
            })
            .collect()
    }

    pub fn last_load(&self) -> Option<MediaLoad> {
        self.loads().pop()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == wanted).count()
    }

    fn control_result(&self) -> BridgeResult<()> {
        if self.fail_controls.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("player not prepared".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    fn kind(&self) -> OutputKind {
        self.kind
    }

    async fn load_and_play(&self, request: MediaLoad) -> BridgeResult<()> {
        self.calls.lock().push(Call::Load(request));
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("unsupported codec".into()));
        }
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.calls.lock().push(Call::Pause);
        self.control_result()
    }

    async fn resume(&self) -> BridgeResult<()> {
        self.calls.lock().push(Call::Resume);
        self.control_result()
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.calls.lock().push(Call::Stop);
        Ok(())
    }

    async fn release(&self) -> BridgeResult<()> {
        self.calls.lock().push(Call::Release);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
        self.calls.lock().push(Call::Volume(volume));
        Ok(())
    }

    async fn position(&self) -> BridgeResult<Duration> {
        Ok(*self.position.lock())
    }

    fn events(&self) -> BoxStream<'static, OutputEvent> {
        let rx = self.events.subscribe();
        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

/// In-memory store that records every play.
pub struct RecordingStore {
    plays: Mutex<Vec<String>>,
    stations: Mutex<HashMap<String, Station>>,
    favorites: watch::Sender<Vec<Station>>,
    fail_records: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        let (favorites, _) = watch::channel(Vec::new());
        Arc::new(Self {
            plays: Mutex::new(Vec::new()),
            stations: Mutex::new(HashMap::new()),
            favorites,
            fail_records: AtomicBool::new(false),
        })
    }

    pub fn plays(&self) -> Vec<String> {
        self.plays.lock().clone()
    }

    pub fn insert(&self, station: Station) {
        self.stations.lock().insert(station.id.clone(), station);
    }

    pub fn fail_records(&self) {
        self.fail_records.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HistoryFavoritesStore for RecordingStore {
    async fn record_play(&self, station: &Station) -> core_library::Result<()> {
        if self.fail_records.load(Ordering::SeqCst) {
            return Err(LibraryError::InvalidInput {
                field: "station".into(),
                message: "disk full".into(),
            });
        }
        self.plays.lock().push(station.id.clone());
        self.insert(station.clone());
        Ok(())
    }

    async fn set_favorite(&self, _station_id: &str, _favorite: bool) -> core_library::Result<()> {
        Ok(())
    }

    async fn is_favorite(&self, _station_id: &str) -> core_library::Result<bool> {
        Ok(false)
    }

    async fn recent_history(&self, _limit: u32) -> core_library::Result<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }

    fn favorites(&self) -> watch::Receiver<Vec<Station>> {
        self.favorites.subscribe()
    }

    async fn station(&self, station_id: &str) -> core_library::Result<Option<Station>> {
        Ok(self.stations.lock().get(station_id).cloned())
    }

    async fn remember_station(&self, station: &Station) -> core_library::Result<()> {
        self.insert(station.clone());
        Ok(())
    }
}

pub struct Harness {
    pub engine: PlaybackEngine,
    pub local: Arc<FakeOutput>,
    pub remote: Arc<FakeOutput>,
    pub store: Arc<RecordingStore>,
    pub events: EventBus,
}

pub fn harness() -> Harness {
    harness_with(PlaybackSettings::default())
}

pub fn harness_with(settings: PlaybackSettings) -> Harness {
    let local = FakeOutput::new(OutputKind::Local);
    let remote = FakeOutput::new(OutputKind::Remote);
    let store = RecordingStore::new();
    let events = EventBus::new(64);
    let engine = PlaybackEngine::new(
        local.clone(),
        Some(remote.clone()),
        store.clone(),
        events.clone(),
        settings,
    );
    Harness {
        engine,
        local,
        remote,
        store,
        events,
    }
}

pub fn station(id: &str) -> Station {
    Station::new(id, format!("Station {}", id), format!("https://{}.example/live", id))
}

/// Wait until the engine reaches a state matching `predicate`.
pub async fn wait_for_state<F>(engine: &PlaybackEngine, predicate: F) -> PlaybackState
where
    F: FnMut(&PlaybackState) -> bool,
{
    let mut rx = engine.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for playback state")
        .expect("engine dropped")
        .clone();
    state
}

/// Wait until `check` holds, polling.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Give the event pumps a chance to drain.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn start_playing(h: &Harness, id: &str) -> Station {
    let station = station(id);
    h.engine.play(station.clone()).await.unwrap();
    h.local.emit_current(OutputEventKind::PlaybackStarted);
    wait_for_state(&h.engine, |s| *s == PlaybackState::Playing(station.clone())).await;
    station
}
