//! Domain models for the station library
//!
//! A [`Station`] is identified by its directory id alone: the stream URL and
//! display fields may change between directory fetches without changing which
//! station it is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::hash::{Hash, Hasher};

/// Internet radio station
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Station {
    /// Directory identifier (radio-browser `stationuuid`)
    pub id: String,
    pub name: String,
    /// Resolved stream URL
    pub stream_url: String,
    pub icon_url: Option<String>,
    /// Primary genre tag
    pub genre: Option<String>,
    /// ISO 3166-1 country code
    pub country: Option<String>,
    /// Primary language
    pub language: Option<String>,
}

impl Station {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        stream_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stream_url: stream_url.into(),
            icon_url: None,
            genre: None,
            country: None,
            language: None,
        }
    }

    pub fn with_icon(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = Some(icon_url.into());
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Validate station data before it is persisted
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Station id cannot be empty".to_string());
        }

        if self.name.trim().is_empty() {
            return Err("Station name cannot be empty".to_string());
        }

        if !is_stream_url(&self.stream_url) {
            return Err(format!(
                "Station stream URL '{}' is not an http(s) URL",
                self.stream_url
            ));
        }

        Ok(())
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Station {}

impl Hash for Station {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// `true` for absolute http/https URLs with a non-empty remainder.
pub fn is_stream_url(url: &str) -> bool {
    let url = url.trim();
    ["http://", "https://"].iter().any(|scheme| {
        url.len() > scheme.len()
            && url
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// One row of play history: the latest snapshot of a station plus counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub station: Station,
    pub last_played_at: DateTime<Utc>,
    pub play_count: u32,
}
