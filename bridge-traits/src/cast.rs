//! Cast session lifecycle signals.
//!
//! Hosts translate their cast SDK session-manager callbacks into
//! [`CastSessionEvent`] values one-to-one; the core collapses them into
//! "remote output available / unavailable" edges.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastSessionEvent {
    Starting,
    Started { session_id: String },
    StartFailed { reason: String },
    Ending,
    Ended { reason: Option<String> },
    Resuming,
    Resumed { was_suspended: bool },
    ResumeFailed { reason: String },
    Suspended { reason: String },
}

impl CastSessionEvent {
    /// `Some(true)` when the event means a remote output is now usable,
    /// `Some(false)` when it means the remote output is gone, `None` for
    /// intermediate signals that do not change availability.
    pub fn availability(&self) -> Option<bool> {
        match self {
            CastSessionEvent::Started { .. } | CastSessionEvent::Resumed { .. } => Some(true),
            CastSessionEvent::StartFailed { .. }
            | CastSessionEvent::Ended { .. }
            | CastSessionEvent::ResumeFailed { .. }
            | CastSessionEvent::Suspended { .. } => Some(false),
            CastSessionEvent::Starting | CastSessionEvent::Ending | CastSessionEvent::Resuming => {
                None
            }
        }
    }
}
