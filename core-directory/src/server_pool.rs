//! Directory server pool with rotate-to-back failover.
//!
//! The pool keeps a deduplicated base list of mirrors and a working rotation
//! that is always a permutation of it. Selecting the next server pops the head
//! of the rotation, pushes it to the tail and skips anything that already
//! failed during the current cycle. When every server has failed the cycle
//! restarts from a freshly shuffled rotation.

use crate::error::{DirectoryError, Result};
use core_runtime::events::{CoreEvent, DirectoryEvent, EventBus};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

/// Base URL of one directory mirror, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(url.as_ref().trim().trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL for an API path such as `/json/tags`.
    pub fn join(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.0, path)
        } else {
            format!("{}/{}", self.0, path)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Endpoint::new(url)
    }
}

impl From<String> for Endpoint {
    fn from(url: String) -> Self {
        Endpoint::new(url)
    }
}

/// Diagnostic view of one pool member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSnapshot {
    pub url: String,
    pub in_current_failure_set: bool,
    pub active: bool,
}

#[derive(Default)]
struct PoolState {
    base: Vec<Endpoint>,
    rotation: VecDeque<Endpoint>,
    failed: HashSet<Endpoint>,
    active: Option<Endpoint>,
    resets: u64,
}

impl PoolState {
    fn with_base(base: Vec<Endpoint>) -> Self {
        let mut state = PoolState {
            base,
            ..Default::default()
        };
        state.rebuild_rotation();
        state
    }

    fn rebuild_rotation(&mut self) {
        let mut order = self.base.clone();
        order.shuffle(&mut thread_rng());
        self.rotation = order.into();
    }

    fn is_usable(&self, endpoint: &Endpoint) -> bool {
        !self.failed.contains(endpoint)
    }

    /// Rotate-to-back probing; restarts the cycle when every member failed.
    fn select_next(&mut self, notes: &mut Vec<DirectoryEvent>) -> Option<Endpoint> {
        if self.base.is_empty() {
            self.active = None;
            return None;
        }

        for _ in 0..self.rotation.len() {
            let Some(candidate) = self.rotation.pop_front() else {
                break;
            };
            self.rotation.push_back(candidate.clone());

            if self.is_usable(&candidate) {
                return Some(self.activate(candidate, notes));
            }
        }

        self.rebuild_rotation();
        self.failed.clear();
        self.resets += 1;
        info!(
            size = self.base.len(),
            resets = self.resets,
            "Every directory server failed this cycle, starting over"
        );
        notes.push(DirectoryEvent::PoolReset {
            size: self.base.len(),
        });

        let head = self.rotation.pop_front()?;
        self.rotation.push_back(head.clone());
        Some(self.activate(head, notes))
    }

    fn activate(&mut self, endpoint: Endpoint, notes: &mut Vec<DirectoryEvent>) -> Endpoint {
        debug!(endpoint = %endpoint, "Directory server selected");
        notes.push(DirectoryEvent::EndpointSelected {
            endpoint: endpoint.to_string(),
        });
        self.active = Some(endpoint.clone());
        endpoint
    }
}

/// Shared, internally synchronised server pool.
///
/// Constructed once and injected into every directory client; the lock is
/// never held across an `.await`.
pub struct ServerPool {
    state: Mutex<PoolState>,
    events: Option<EventBus>,
}

impl ServerPool {
    /// Build a pool from an ordered list; duplicates keep their first position.
    pub fn new<I, E>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Endpoint>,
    {
        Self {
            state: Mutex::new(PoolState::with_base(dedup(endpoints))),
            events: None,
        }
    }

    /// Publish pool changes as [`DirectoryEvent`]s.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Current server, selecting one if none is active or the active one failed.
    ///
    /// # Errors
    /// [`DirectoryError::NoEndpoint`] when the pool is empty.
    pub fn active_endpoint(&self) -> Result<Endpoint> {
        let mut notes = Vec::new();
        let selected = {
            let mut state = self.state.lock();
            match state.active.clone() {
                Some(active) if state.is_usable(&active) => Some(active),
                _ => state.select_next(&mut notes),
            }
        };
        self.publish(notes);
        selected.ok_or(DirectoryError::NoEndpoint)
    }

    /// Record that `endpoint` failed a request.
    ///
    /// Moves to another server only when the failed one is the active one (or
    /// nothing is active), so concurrent reports for the same server rotate once.
    pub fn report_failure(&self, endpoint: &Endpoint) {
        let mut notes = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.base.contains(endpoint) {
                warn!(endpoint = %endpoint, "Ignoring failure report for unknown directory server");
                return;
            }

            if state.failed.insert(endpoint.clone()) {
                warn!(endpoint = %endpoint, "Directory server marked failed");
                notes.push(DirectoryEvent::EndpointFailed {
                    endpoint: endpoint.to_string(),
                });
            }

            let must_move = match &state.active {
                None => true,
                Some(active) => active == endpoint,
            };
            if must_move {
                state.select_next(&mut notes);
            }
        }
        self.publish(notes);
    }

    /// Abandon the active server and pick a different one.
    ///
    /// With a single-member pool the same server comes back after the reset.
    pub fn force_rotate(&self) -> Result<Endpoint> {
        let mut notes = Vec::new();
        let selected = {
            let mut state = self.state.lock();
            let previous = state.active.clone();
            if let Some(previous) = &previous {
                state.failed.insert(previous.clone());
            }

            let mut next = state.select_next(&mut notes);
            // A reset may hand the abandoned server straight back.
            if state.base.len() > 1 && next.is_some() && next == previous {
                if let Some(again) = next.take() {
                    state.failed.insert(again);
                }
                next = state.select_next(&mut notes);
            }
            next
        };
        self.publish(notes);
        selected.ok_or(DirectoryError::NoEndpoint)
    }

    /// Replace the whole pool. An empty list is refused and the pool is kept.
    pub fn replace_pool<I, E>(&self, endpoints: I) -> bool
    where
        I: IntoIterator<Item = E>,
        E: Into<Endpoint>,
    {
        let base = dedup(endpoints);
        if base.is_empty() {
            warn!("Refusing to replace directory server pool with an empty list");
            return false;
        }

        let size = base.len();
        let mut notes = vec![DirectoryEvent::PoolReplaced { size }];
        {
            let mut state = self.state.lock();
            let resets = state.resets;
            *state = PoolState::with_base(base);
            state.resets = resets;
            state.select_next(&mut notes);
        }
        info!(size, "Directory server pool replaced");
        self.publish(notes);
        true
    }

    /// Members in base order with their failure flag.
    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let state = self.state.lock();
        state
            .base
            .iter()
            .map(|endpoint| EndpointSnapshot {
                url: endpoint.to_string(),
                in_current_failure_set: state.failed.contains(endpoint),
                active: state.active.as_ref() == Some(endpoint),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times every server failed and the cycle restarted.
    pub fn reset_count(&self) -> u64 {
        self.state.lock().resets
    }

    fn publish(&self, notes: Vec<DirectoryEvent>) {
        let Some(events) = &self.events else {
            return;
        };
        for note in notes {
            let _ = events.emit(CoreEvent::Directory(note));
        }
    }

    #[cfg(test)]
    fn rotation_is_permutation(&self) -> bool {
        let state = self.state.lock();
        let mut rotation: Vec<_> = state.rotation.iter().map(|e| e.to_string()).collect();
        let mut base: Vec<_> = state.base.iter().map(|e| e.to_string()).collect();
        rotation.sort();
        base.sort();
        rotation == base
    }
}

impl fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ServerPool")
            .field("size", &state.base.len())
            .field("active", &state.active)
            .field("failed", &state.failed.len())
            .field("resets", &state.resets)
            .finish()
    }
}

fn dedup<I, E>(endpoints: I) -> Vec<Endpoint>
where
    I: IntoIterator<Item = E>,
    E: Into<Endpoint>,
{
    let mut seen = HashSet::new();
    endpoints
        .into_iter()
        .map(Into::into)
        .filter(|endpoint: &Endpoint| !endpoint.as_str().is_empty())
        .filter(|endpoint| seen.insert(endpoint.clone()))
        .collect()
}
