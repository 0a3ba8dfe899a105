//! Sleep timer: pauses playback once a countdown elapses.
//!
//! At most one countdown is armed. Each arm gets a token; the firing task
//! only pauses if its token is still the armed one, and `cancel` clears the
//! token under the same lock, so a cancelled countdown never pauses.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, SleepTimerEvent};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::PauseTarget;

struct ArmedTimer {
    token: u64,
    ends_at: DateTime<Utc>,
    deadline: Instant,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct TimerSlot {
    armed: Option<ArmedTimer>,
    next_token: u64,
}

struct TimerInner {
    target: Arc<dyn PauseTarget>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    slot: Mutex<TimerSlot>,
}

/// Cancellable countdown that pauses playback when it elapses.
#[derive(Clone)]
pub struct SleepTimer {
    inner: Arc<TimerInner>,
}

impl SleepTimer {
    pub fn new(target: Arc<dyn PauseTarget>, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                target,
                clock,
                events,
                slot: Mutex::new(TimerSlot::default()),
            }),
        }
    }

    /// Arm the timer, replacing any countdown already running.
    ///
    /// Returns the wall-clock time the timer will fire. Must be called from
    /// within a Tokio runtime.
    pub fn arm(&self, duration: Duration) -> DateTime<Utc> {
        let ends_at = self.inner.clock.deadline(duration);

        {
            let mut slot = self.inner.slot.lock();
            if let Some(previous) = slot.armed.take() {
                debug!(token = previous.token, "Replacing armed sleep timer");
                previous.task.abort();
            }

            slot.next_token += 1;
            let token = slot.next_token;
            let timer: Weak<TimerInner> = Arc::downgrade(&self.inner);
            let task = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if let Some(timer) = timer.upgrade() {
                    timer.fire(token).await;
                }
            });

            slot.armed = Some(ArmedTimer {
                token,
                ends_at,
                deadline: Instant::now() + duration,
                task,
            });
        }

        info!(?duration, %ends_at, "Sleep timer armed");
        let _ = self
            .inner
            .events
            .emit(CoreEvent::SleepTimer(SleepTimerEvent::Armed {
                ends_at_ms: ends_at.timestamp_millis(),
            }));
        ends_at
    }

    /// Cancel the countdown. Idempotent.
    ///
    /// Once this returns the armed countdown will not pause playback. A
    /// countdown that already elapsed is not revoked: its `Fired` event is
    /// published before `cancel` can observe the empty slot, and the pause it
    /// issues still goes through.
    pub fn cancel(&self) {
        let Some(armed) = self.inner.slot.lock().armed.take() else {
            return;
        };
        armed.task.abort();
        info!(token = armed.token, "Sleep timer cancelled");
        let _ = self
            .inner
            .events
            .emit(CoreEvent::SleepTimer(SleepTimerEvent::Cancelled));
    }

    pub fn is_armed(&self) -> bool {
        self.inner.slot.lock().armed.is_some()
    }

    /// Wall-clock time the armed countdown fires at.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.inner.slot.lock().armed.as_ref().map(|a| a.ends_at)
    }

    /// Time left on the armed countdown.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .slot
            .lock()
            .armed
            .as_ref()
            .map(|a| a.deadline.saturating_duration_since(Instant::now()))
    }
}

impl TimerInner {
    async fn fire(&self, token: u64) {
        let claimed = {
            let mut slot = self.slot.lock();
            let claimed = slot.armed.as_ref().is_some_and(|a| a.token == token);
            if claimed {
                slot.armed = None;
                // Fired is published before the slot is released.
                let _ = self.events.emit(CoreEvent::SleepTimer(SleepTimerEvent::Fired));
            }
            claimed
        };
        if !claimed {
            debug!(token, "Sleep timer superseded before firing");
            return;
        }

        info!("Sleep timer elapsed, pausing playback");

        if let Err(e) = self.target.pause().await {
            warn!(error = %e, "Sleep timer failed to pause playback");
            let _ = self
                .events
                .emit(CoreEvent::SleepTimer(SleepTimerEvent::PauseFailed {
                    message: e.to_string(),
                }));
        }
    }
}

impl Drop for TimerInner {
    fn drop(&mut self) {
        if let Some(armed) = self.slot.get_mut().armed.take() {
            armed.task.abort();
        }
    }
}
