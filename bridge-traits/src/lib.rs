//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the radio core and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that must be implemented differently per platform (desktop, Android, iOS).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-shot async HTTP used by the station directory
//!
//! ### Audio
//! - [`AudioOutput`](playback::AudioOutput) - Local player or cast receiver
//! - [`CastSessionEvent`](cast::CastSessionEvent) - Cast session lifecycle signals
//!
//! ### Platform Integration
//! - [`AlarmScheduler`](alarm::AlarmScheduler) - OS wake-up alarms
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Wall-clock source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should report "no response at all" as [`BridgeError::Transport`] so callers
//! can fail over to another server, and platform refusals as
//! [`BridgeError::PermissionDenied`].
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! async tasks behind `Arc`.

pub mod alarm;
pub mod cast;
pub mod error;
pub mod http;
pub mod playback;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use alarm::{Alarm, AlarmScheduler};
pub use cast::CastSessionEvent;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use playback::{
    AudioOutput, MediaLoad, OutputEvent, OutputEventKind, OutputKind, PlaybackSessionId,
};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
