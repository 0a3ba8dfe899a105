//! Audio output bridge traits.
//!
//! The core drives two interchangeable output backends: the local decoder
//! (platform media player) and a remote cast device. Both are exposed through
//! [`AudioOutput`]; the playback engine never knows which concrete player sits
//! behind it.

use crate::error::Result;
use futures::stream::BoxStream;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Which physical route an output renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Decoded and rendered on this device.
    Local,
    /// Rendered by a cast receiver.
    Remote,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Local => f.write_str("local"),
            OutputKind::Remote => f.write_str("remote"),
        }
    }
}

/// Identifier for one load issued to an output.
///
/// Every [`MediaLoad`] carries a fresh id and every [`OutputEvent`] echoes the
/// id of the load it belongs to, so callers can discard events from loads
/// they have since superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackSessionId(Uuid);

impl PlaybackSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlaybackSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaybackSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to load a stream into an output.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaLoad {
    pub session: PlaybackSessionId,
    pub stream_url: String,
    pub station_id: String,
    /// Position to start from (live streams usually ignore it).
    pub start_position: Duration,
    /// Start rendering as soon as the stream is ready; otherwise stay paused.
    pub play_when_ready: bool,
}

/// Event kinds reported by an output backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEventKind {
    Ready,
    PlaybackStarted,
    PlaybackPaused,
    Error(String),
    Ended,
}

/// Event reported by an output backend, tagged with the load it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub session: PlaybackSessionId,
    pub kind: OutputEventKind,
}

impl OutputEvent {
    pub fn new(session: PlaybackSessionId, kind: OutputEventKind) -> Self {
        Self { session, kind }
    }
}

/// Output backend contract.
///
/// Implementations must tolerate `release` while a load is in flight: any
/// asynchronous completion arriving afterwards is silently ignored.
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Route this output renders to.
    fn kind(&self) -> OutputKind;

    /// Replace whatever is loaded with `request` and start preparing it.
    ///
    /// Returning `Ok` only means the load was accepted; readiness and start
    /// are reported through [`AudioOutput::events`].
    async fn load_and_play(&self, request: MediaLoad) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Stop rendering and drop the loaded media.
    async fn stop(&self) -> Result<()>;

    /// Free every native resource held by the output.
    async fn release(&self) -> Result<()>;

    /// Output volume, normalized to `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Current playback position of the loaded media.
    async fn position(&self) -> Result<Duration>;

    /// Subscribe to backend events. Each call returns an independent stream
    /// that yields events in the order the backend produced them.
    fn events(&self) -> BoxStream<'static, OutputEvent>;
}
