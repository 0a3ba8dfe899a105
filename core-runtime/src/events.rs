//! # Event Bus System
//!
//! Provides an event-driven architecture for the radio core using `tokio::sync::broadcast`.
//! Components publish typed events; hosts and other components subscribe independently.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐    emit     ┌───────────┐
//! │ PlaybackEngine ├────────────>│           │
//! └────────────────┘             │           │   subscribe   ┌────────────┐
//! ┌────────────────┐    emit     │ EventBus  ├──────────────>│ UI / host  │
//! │ ServerPool     ├────────────>│ (broadcast│               └────────────┘
//! └────────────────┘             │  channel) │
//! ┌────────────────┐    emit     │           │   subscribe   ┌────────────┐
//! │ SleepTimer     ├────────────>│           ├──────────────>│ Subscriber │
//! └────────────────┘             └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Playback(PlaybackEvent::Stopped { station_id: None }))
//!     .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Playback stopped");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: subscriber was too slow and missed `n` events; non-fatal.
//! - **`RecvError::Closed`**: all senders dropped; treat as shutdown.
//!
//! Publishing with no subscribers returns an error that publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Playback(PlaybackEvent),
    Directory(DirectoryEvent),
    SleepTimer(SleepTimerEvent),
    Cast(CastEvent),
    Alarm(AlarmEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Directory(e) => e.description(),
            CoreEvent::SleepTimer(e) => e.description(),
            CoreEvent::Cast(e) => e.description(),
            CoreEvent::Alarm(e) => e.description(),
        }
    }

    /// Severity hint for hosts deciding whether to surface the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Alarm(AlarmEvent::PermissionDenied { .. })
            | CoreEvent::Alarm(AlarmEvent::FireFailed { .. }) => EventSeverity::Error,
            CoreEvent::SleepTimer(SleepTimerEvent::PauseFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Directory(DirectoryEvent::EndpointFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Started { .. })
            | CoreEvent::SleepTimer(SleepTimerEvent::Fired)
            | CoreEvent::Alarm(AlarmEvent::Fired { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    Started { station_id: String, name: String },
    Paused { station_id: String },
    Resumed { station_id: String },
    Stopped { station_id: Option<String> },
    Error {
        station_id: Option<String>,
        message: String,
    },
    /// Audio moved between the local player and a cast receiver.
    OutputSwitched { target: String },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Error { .. } => "Playback error",
            PlaybackEvent::OutputSwitched { .. } => "Audio output switched",
        }
    }
}

// ============================================================================
// Directory Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DirectoryEvent {
    EndpointFailed { endpoint: String },
    EndpointSelected { endpoint: String },
    /// Every endpoint failed during the current cycle and the rotation restarted.
    PoolReset { size: usize },
    PoolReplaced { size: usize },
}

impl DirectoryEvent {
    fn description(&self) -> &str {
        match self {
            DirectoryEvent::EndpointFailed { .. } => "Directory server failed",
            DirectoryEvent::EndpointSelected { .. } => "Directory server selected",
            DirectoryEvent::PoolReset { .. } => "Directory server rotation reset",
            DirectoryEvent::PoolReplaced { .. } => "Directory server list replaced",
        }
    }
}

// ============================================================================
// Sleep Timer Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SleepTimerEvent {
    Armed { ends_at_ms: i64 },
    Cancelled,
    Fired,
    PauseFailed { message: String },
}

impl SleepTimerEvent {
    fn description(&self) -> &str {
        match self {
            SleepTimerEvent::Armed { .. } => "Sleep timer armed",
            SleepTimerEvent::Cancelled => "Sleep timer cancelled",
            SleepTimerEvent::Fired => "Sleep timer fired",
            SleepTimerEvent::PauseFailed { .. } => "Sleep timer could not pause playback",
        }
    }
}

// ============================================================================
// Cast Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CastEvent {
    RemoteAvailable,
    RemoteUnavailable,
}

impl CastEvent {
    fn description(&self) -> &str {
        match self {
            CastEvent::RemoteAvailable => "Cast device connected",
            CastEvent::RemoteUnavailable => "Cast device disconnected",
        }
    }
}

// ============================================================================
// Alarm Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AlarmEvent {
    Scheduled {
        alarm_id: String,
        station_id: String,
        fire_at_ms: i64,
    },
    Cancelled { alarm_id: String },
    PermissionDenied { station_id: String, message: String },
    Fired { station_id: String },
    FireFailed { station_id: String, message: String },
}

impl AlarmEvent {
    fn description(&self) -> &str {
        match self {
            AlarmEvent::Scheduled { .. } => "Alarm scheduled",
            AlarmEvent::Cancelled { .. } => "Alarm cancelled",
            AlarmEvent::PermissionDenied { .. } => "Alarm permission denied",
            AlarmEvent::Fired { .. } => "Alarm fired",
            AlarmEvent::FireFailed { .. } => "Alarm could not start playback",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Fails only when nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver wrapper that skips events rejected by a predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Cast(CastEvent::RemoteAvailable);

        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Playback(PlaybackEvent::Started {
            station_id: "st-1".to_string(),
            name: "Jazz FM".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::SleepTimer(_)));

        bus.emit(CoreEvent::Directory(DirectoryEvent::PoolReset { size: 3 }))
            .ok();
        bus.emit(CoreEvent::SleepTimer(SleepTimerEvent::Fired)).ok();

        let received = stream.recv().await.unwrap();
        assert_eq!(received, CoreEvent::SleepTimer(SleepTimerEvent::Fired));
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(CoreEvent::Directory(DirectoryEvent::EndpointFailed {
                endpoint: format!("https://server-{}", i),
            }))
            .ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let error = CoreEvent::Playback(PlaybackEvent::Error {
            station_id: None,
            message: "decoder failure".to_string(),
        });
        assert_eq!(error.severity(), EventSeverity::Error);

        let denied = CoreEvent::Alarm(AlarmEvent::PermissionDenied {
            station_id: "st-1".to_string(),
            message: "exact alarms disabled".to_string(),
        });
        assert_eq!(denied.severity(), EventSeverity::Error);

        let switched = CoreEvent::Playback(PlaybackEvent::OutputSwitched {
            target: "remote".to_string(),
        });
        assert_eq!(switched.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::SleepTimer(SleepTimerEvent::Armed { ends_at_ms: 42 });
        let json = serde_json::to_string(&event).unwrap();
        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert!(json.contains("\"type\":\"SleepTimer\""));
    }
}
