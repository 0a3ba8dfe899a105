//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (audio outputs,
//! alarm scheduler, clock) and the configured HTTP client into the shared
//! radio core. Desktop apps typically enable the `desktop-shims` feature,
//! which supplies a `reqwest` based HTTP client through `bridge-desktop`.

pub mod alarm;
pub mod error;

pub use alarm::AlarmService;
pub use error::{CoreError, Result};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::ReqwestHttpClient;

use std::path::Path;
use std::sync::Arc;

use bridge_traits::{
    alarm::AlarmScheduler,
    playback::AudioOutput,
    time::{Clock, SystemClock},
};
use core_directory::{ServerPool, StationDirectoryClient};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{HistoryFavoritesStore, SqliteHistoryStore};
use core_playback::{CastBridge, PlaybackEngine, SleepTimer};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use tracing::info;

/// Aggregated handle to all host capabilities the core requires.
pub struct CoreDependencies {
    pub local_output: Arc<dyn AudioOutput>,
    pub remote_output: Option<Arc<dyn AudioOutput>>,
    pub alarm_scheduler: Option<Arc<dyn AlarmScheduler>>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle around the local player.
    pub fn new(local_output: Arc<dyn AudioOutput>) -> Self {
        Self {
            local_output,
            remote_output: None,
            alarm_scheduler: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Attach the cast receiver output.
    pub fn with_remote_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.remote_output = Some(output);
        self
    }

    pub fn with_alarm_scheduler(mut self, scheduler: Arc<dyn AlarmScheduler>) -> Self {
        self.alarm_scheduler = Some(scheduler);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Primary façade exposed to host applications.
///
/// Every component is constructed here and injected into the others; there
/// are no process-wide singletons.
#[derive(Clone)]
pub struct RadioCore {
    events: EventBus,
    directory: Arc<StationDirectoryClient>,
    library: Arc<SqliteHistoryStore>,
    playback: PlaybackEngine,
    sleep_timer: SleepTimer,
    cast: Arc<CastBridge>,
    alarms: Arc<AlarmService>,
}

impl RadioCore {
    /// Open the library database and wire every component.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or the database cannot be
    /// opened and migrated.
    pub async fn bootstrap(config: CoreConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let db = create_pool(database_config(&config.database_path)).await?;
        let library = SqliteHistoryStore::with_clock(db, deps.clock.clone()).await?;

        let events = EventBus::new(config.event_buffer_size);
        let servers = config.directory.servers.iter().map(String::as_str);
        let pool = Arc::new(ServerPool::new(servers).with_events(events.clone()));
        let directory = Arc::new(StationDirectoryClient::new(
            config.http_client.clone(),
            pool,
            config.directory.clone(),
        ));

        let library = Arc::new(library);
        let store: Arc<dyn HistoryFavoritesStore> = library.clone();
        let playback = PlaybackEngine::new(
            deps.local_output,
            deps.remote_output,
            store.clone(),
            events.clone(),
            config.playback,
        );
        let sleep_timer = SleepTimer::new(
            Arc::new(playback.clone()),
            deps.clock.clone(),
            events.clone(),
        );
        let cast =
            Arc::new(CastBridge::new(Arc::new(playback.clone())).with_events(events.clone()));
        let alarms = Arc::new(AlarmService::new(
            deps.alarm_scheduler,
            store,
            playback.clone(),
            deps.clock,
            events.clone(),
        ));

        info!(
            servers = config.directory.servers.len(),
            cast = playback.has_remote_output(),
            alarms = alarms.is_available(),
            "Radio core ready"
        );

        Ok(Self {
            events,
            directory,
            library,
            playback,
            sleep_timer,
            cast,
            alarms,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn directory(&self) -> &StationDirectoryClient {
        &self.directory
    }

    pub fn library(&self) -> &SqliteHistoryStore {
        &self.library
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub fn sleep_timer(&self) -> &SleepTimer {
        &self.sleep_timer
    }

    pub fn cast(&self) -> &CastBridge {
        &self.cast
    }

    pub fn alarms(&self) -> &AlarmService {
        &self.alarms
    }

    /// Cancel the sleep timer and release the outputs.
    pub async fn shutdown(&self) {
        self.sleep_timer.cancel();
        self.playback.shutdown().await;
        info!("Radio core shut down");
    }
}

fn database_config(path: &Path) -> DatabaseConfig {
    if path.as_os_str() == ":memory:" {
        DatabaseConfig::in_memory()
    } else {
        DatabaseConfig::new(path)
    }
}
