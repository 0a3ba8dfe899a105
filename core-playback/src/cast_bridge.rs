//! Collapses cast session callbacks into remote-route edges.
//!
//! Session managers report the same state repeatedly (resume after resume,
//! end after a failed start). The bridge remembers the last availability and
//! only notifies its listener when it flips.

use std::sync::Arc;

use bridge_traits::cast::CastSessionEvent;
use core_runtime::events::{CastEvent, CoreEvent, EventBus};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::engine::RemoteRouteListener;

pub struct CastBridge {
    /// Held across listener delivery so edges reach it in order.
    available: Mutex<bool>,
    listener: Arc<dyn RemoteRouteListener>,
    events: Option<EventBus>,
}

impl CastBridge {
    pub fn new(listener: Arc<dyn RemoteRouteListener>) -> Self {
        Self {
            available: Mutex::new(false),
            listener,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn is_remote_available(&self) -> bool {
        *self.available.lock().await
    }

    /// Feed one session-manager callback.
    pub async fn on_session_event(&self, event: &CastSessionEvent) {
        let Some(now_available) = event.availability() else {
            debug!(?event, "Cast session transition");
            return;
        };

        let mut available = self.available.lock().await;
        if *available == now_available {
            debug!(?event, available = now_available, "Duplicate cast availability");
            return;
        }
        *available = now_available;

        if now_available {
            info!(?event, "Remote output available");
            self.emit(CastEvent::RemoteAvailable);
            self.listener.remote_available().await;
        } else {
            info!(?event, "Remote output unavailable");
            self.emit(CastEvent::RemoteUnavailable);
            self.listener.remote_unavailable().await;
        }
    }

    fn emit(&self, event: CastEvent) {
        if let Some(events) = &self.events {
            let _ = events.emit(CoreEvent::Cast(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    #[derive(Default)]
    struct RecordingListener {
        calls: SyncMutex<Vec<bool>>,
    }

    #[async_trait]
    impl RemoteRouteListener for RecordingListener {
        async fn remote_available(&self) {
            self.calls.lock().push(true);
        }

        async fn remote_unavailable(&self) {
            self.calls.lock().push(false);
        }
    }

    fn started() -> CastSessionEvent {
        CastSessionEvent::Started {
            session_id: "cast-1".into(),
        }
    }

    #[tokio::test]
    async fn test_only_edges_reach_listener() {
        let listener = Arc::new(RecordingListener::default());
        let bridge = CastBridge::new(listener.clone());

        bridge.on_session_event(&CastSessionEvent::Starting).await;
        bridge.on_session_event(&started()).await;
        bridge.on_session_event(&started()).await;
        bridge
            .on_session_event(&CastSessionEvent::Resumed {
                was_suspended: false,
            })
            .await;
        bridge.on_session_event(&CastSessionEvent::Ending).await;
        bridge
            .on_session_event(&CastSessionEvent::Ended { reason: None })
            .await;
        bridge
            .on_session_event(&CastSessionEvent::Suspended {
                reason: "network".into(),
            })
            .await;

        assert_eq!(*listener.calls.lock(), vec![true, false]);
        assert!(!bridge.is_remote_available().await);
    }

    #[tokio::test]
    async fn test_failed_start_is_not_an_edge() {
        let listener = Arc::new(RecordingListener::default());
        let bridge = CastBridge::new(listener.clone());

        bridge
            .on_session_event(&CastSessionEvent::StartFailed {
                reason: "timeout".into(),
            })
            .await;

        assert!(listener.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_edges_are_published() {
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let bridge =
            CastBridge::new(Arc::new(RecordingListener::default())).with_events(events.clone());

        bridge.on_session_event(&started()).await;
        bridge
            .on_session_event(&CastSessionEvent::ResumeFailed {
                reason: "gone".into(),
            })
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            CoreEvent::Cast(CastEvent::RemoteAvailable)
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            CoreEvent::Cast(CastEvent::RemoteUnavailable)
        );
    }
}
