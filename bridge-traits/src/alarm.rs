//! Alarm scheduling collaborator.
//!
//! The OS owns wake-up scheduling (exact alarms, boot persistence). The core
//! only asks the host to arm or disarm an alarm and is called back through
//! `on_alarm_fired` when it goes off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Alarm that starts a station at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: Uuid,
    pub station_id: String,
    pub fire_at: DateTime<Utc>,
}

impl Alarm {
    pub fn new(station_id: impl Into<String>, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            station_id: station_id.into(),
            fire_at,
        }
    }
}

/// Host alarm scheduler.
///
/// # Errors
///
/// `schedule` returns [`BridgeError::PermissionDenied`](crate::BridgeError::PermissionDenied)
/// when the platform refuses exact alarms for this app.
#[async_trait::async_trait]
pub trait AlarmScheduler: Send + Sync {
    async fn schedule(&self, alarm: &Alarm) -> Result<()>;

    async fn cancel(&self, alarm_id: Uuid) -> Result<()>;
}
