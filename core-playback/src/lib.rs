//! # Playback Module
//!
//! Owns what is playing and where it is rendered.
//!
//! ## Overview
//!
//! This module handles:
//! - The playback state machine driving local and cast outputs
//! - Audio focus reactions (pause, duck, optional auto-resume)
//! - Moving a live stream between the local player and a cast receiver
//! - The sleep timer
//!
//! Backends are reached only through [`bridge_traits::playback::AudioOutput`].

pub mod cast_bridge;
pub mod engine;
pub mod error;
pub mod sleep_timer;
pub mod state;

pub use cast_bridge::CastBridge;
pub use engine::{PauseTarget, PlaybackEngine, RemoteRouteListener};
pub use error::{PlaybackError, Result};
pub use sleep_timer::SleepTimer;
pub use state::{FocusChange, PlaybackState};
