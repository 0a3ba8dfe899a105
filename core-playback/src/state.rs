//! Observable playback state.

use core_library::models::Station;
use serde::Serialize;

/// What the engine is doing right now.
///
/// Exactly one value is live per engine; observers receive snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "station")]
pub enum PlaybackState {
    Idle,
    /// A stream was requested and the backend is buffering it.
    Loading(Station),
    Playing(Station),
    Paused(Station),
    /// The backend failed; the failed station is kept for display and retry.
    Error {
        station: Option<Station>,
        message: String,
    },
}

impl PlaybackState {
    /// Station that is loaded into an output, if any.
    ///
    /// `Error` keeps its station for display only, so it reports `None`.
    pub fn station(&self) -> Option<&Station> {
        match self {
            PlaybackState::Loading(station)
            | PlaybackState::Playing(station)
            | PlaybackState::Paused(station) => Some(station),
            PlaybackState::Idle | PlaybackState::Error { .. } => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }

    /// `true` while the user intends audio to come out (loading or playing).
    pub fn wants_audio(&self) -> bool {
        matches!(self, PlaybackState::Loading(_) | PlaybackState::Playing(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading(_) => "loading",
            PlaybackState::Playing(_) => "playing",
            PlaybackState::Paused(_) => "paused",
            PlaybackState::Error { .. } => "error",
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Idle
    }
}

/// Audio focus changes delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    /// Another app took focus for good (e.g. started its own playback).
    Loss,
    /// Short interruption such as a phone call.
    LossTransient,
    /// Short interruption that tolerates quieter playback (navigation prompt).
    LossTransientCanDuck,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> Station {
        Station::new("st-1", "Jazz", "https://jazz.example/live")
    }

    #[test]
    fn error_state_has_no_current_station() {
        let state = PlaybackState::Error {
            station: Some(station()),
            message: "decoder".into(),
        };
        assert_eq!(state.station(), None);
        assert_eq!(PlaybackState::Paused(station()).station(), Some(&station()));
    }

    #[test]
    fn wants_audio_covers_loading_and_playing() {
        assert!(PlaybackState::Loading(station()).wants_audio());
        assert!(PlaybackState::Playing(station()).wants_audio());
        assert!(!PlaybackState::Paused(station()).wants_audio());
        assert!(!PlaybackState::Idle.wants_audio());
    }

    #[test]
    fn serializes_with_tag() {
        let json = serde_json::to_value(PlaybackState::Playing(station())).unwrap();
        assert_eq!(json["state"], "Playing");
        assert_eq!(json["station"]["id"], "st-1");
    }
}
