//! Wake-up alarms that start a station.
//!
//! The host scheduler owns the actual wake-up; this service validates the
//! request, keeps the station resolvable for when the alarm fires, and turns
//! platform refusals into a typed error instead of a crash.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::alarm::{Alarm, AlarmScheduler};
use bridge_traits::error::BridgeError;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_library::{HistoryFavoritesStore, Station};
use core_playback::{PlaybackEngine, PlaybackError};
use core_runtime::events::{AlarmEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub struct AlarmService {
    scheduler: Option<Arc<dyn AlarmScheduler>>,
    store: Arc<dyn HistoryFavoritesStore>,
    engine: PlaybackEngine,
    clock: Arc<dyn Clock>,
    events: EventBus,
    pending: Mutex<HashMap<Uuid, Alarm>>,
}

impl AlarmService {
    pub fn new(
        scheduler: Option<Arc<dyn AlarmScheduler>>,
        store: Arc<dyn HistoryFavoritesStore>,
        engine: PlaybackEngine,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            scheduler,
            store,
            engine,
            clock,
            events,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Arm an alarm for a station the library already knows.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Permission`] when the platform refuses exact alarms;
    ///   nothing is armed in that case
    /// - [`CoreError::InvalidAlarm`] when `fire_at` is not in the future
    /// - [`PlaybackError::StationNotFound`] when the station is unknown
    #[instrument(skip(self))]
    pub async fn schedule(&self, station_id: &str, fire_at: DateTime<Utc>) -> Result<Alarm> {
        let scheduler = self.scheduler()?;

        if fire_at <= self.clock.now() {
            return Err(CoreError::InvalidAlarm(format!(
                "fire time {} is in the past",
                fire_at
            )));
        }
        if self.store.station(station_id).await?.is_none() {
            return Err(PlaybackError::StationNotFound(station_id.to_string()).into());
        }

        let alarm = Alarm::new(station_id, fire_at);
        match scheduler.schedule(&alarm).await {
            Ok(()) => {}
            Err(BridgeError::PermissionDenied(message)) => {
                warn!(station_id, error = %message, "Platform refused to schedule alarm");
                self.emit(AlarmEvent::PermissionDenied {
                    station_id: station_id.to_string(),
                    message: message.clone(),
                });
                return Err(CoreError::Permission(message));
            }
            Err(e) => return Err(e.into()),
        }

        info!(alarm_id = %alarm.id, station_id, %fire_at, "Alarm scheduled");
        self.pending.lock().insert(alarm.id, alarm.clone());
        self.emit(AlarmEvent::Scheduled {
            alarm_id: alarm.id.to_string(),
            station_id: station_id.to_string(),
            fire_at_ms: fire_at.timestamp_millis(),
        });
        Ok(alarm)
    }

    /// Remember `station` and arm an alarm for it.
    pub async fn schedule_station(&self, station: &Station, fire_at: DateTime<Utc>) -> Result<Alarm> {
        self.store.remember_station(station).await?;
        self.schedule(&station.id, fire_at).await
    }

    pub async fn cancel(&self, alarm_id: Uuid) -> Result<()> {
        let scheduler = self.scheduler()?;
        scheduler.cancel(alarm_id).await?;

        if self.pending.lock().remove(&alarm_id).is_some() {
            info!(%alarm_id, "Alarm cancelled");
        }
        self.emit(AlarmEvent::Cancelled {
            alarm_id: alarm_id.to_string(),
        });
        Ok(())
    }

    /// Alarms armed through this service, soonest first.
    pub fn pending(&self) -> Vec<Alarm> {
        let mut alarms: Vec<Alarm> = self.pending.lock().values().cloned().collect();
        alarms.sort_by_key(|a| a.fire_at);
        alarms
    }

    /// Host callback for a fired alarm: start the station.
    pub async fn on_alarm_fired(&self, station_id: &str) -> Result<()> {
        let now = self.clock.now();
        self.pending
            .lock()
            .retain(|_, a| !(a.station_id == station_id && a.fire_at <= now));

        self.emit(AlarmEvent::Fired {
            station_id: station_id.to_string(),
        });

        if let Err(e) = self.engine.on_alarm_fired(station_id).await {
            warn!(station_id, error = %e, "Alarm could not start playback");
            self.emit(AlarmEvent::FireFailed {
                station_id: station_id.to_string(),
                message: e.to_string(),
            });
            return Err(e.into());
        }
        Ok(())
    }

    fn scheduler(&self) -> Result<&Arc<dyn AlarmScheduler>> {
        self.scheduler
            .as_ref()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "AlarmScheduler".to_string(),
                message: "Host did not provide an alarm scheduler".to_string(),
            })
    }

    fn emit(&self, event: AlarmEvent) {
        let _ = self.events.emit(CoreEvent::Alarm(event));
    }
}
