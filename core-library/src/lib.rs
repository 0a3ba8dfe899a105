//! # Station Library Module
//!
//! Owns the local station database: play history, favorites, and the
//! station snapshots they refer to.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - The [`Station`] and [`HistoryEntry`] models
//! - The [`HistoryFavoritesStore`] collaborator used by playback and the UI

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use error::{LibraryError, Result};
pub use models::{HistoryEntry, Station};
pub use store::{HistoryFavoritesStore, SqliteHistoryStore};
