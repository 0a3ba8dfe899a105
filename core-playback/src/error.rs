//! # Playback Error Types

use bridge_traits::error::BridgeError;
use bridge_traits::playback::OutputKind;
use core_library::error::LibraryError;
use thiserror::Error;

/// Errors that can occur during playback operations.
///
/// Backend faults reported while a stream plays do not surface here; they
/// move the engine into [`PlaybackState::Error`](crate::PlaybackState::Error).
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Station data cannot be played (blank name, non-http stream URL).
    #[error("Invalid station: {0}")]
    InvalidStation(String),

    /// Station is not known to the local library.
    #[error("Station not found: {0}")]
    StationNotFound(String),

    /// No backend is attached for the requested route.
    #[error("No {0} output available")]
    OutputUnavailable(OutputKind),

    /// A backend rejected a command.
    #[error("Output error: {0}")]
    Output(#[from] BridgeError),

    /// Invalid volume value (must be in range [0.0, 1.0]).
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
