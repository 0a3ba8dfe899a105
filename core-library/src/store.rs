//! History and favorites store
//!
//! The playback engine records plays here; the UI reads recent history and a
//! live favorites list. History rows are only ever inserted or updated.

use crate::error::{LibraryError, Result};
use crate::models::{HistoryEntry, Station};
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, FromRow, SqlitePool};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Persistence collaborator for play history and favorites.
#[async_trait]
pub trait HistoryFavoritesStore: Send + Sync {
    /// Upsert the station snapshot, stamp `last_played_at` and increment its play count.
    async fn record_play(&self, station: &Station) -> Result<()>;

    /// Mark or unmark a known station as favorite.
    ///
    /// # Errors
    /// [`LibraryError::NotFound`] when favoriting a station that was never
    /// played or remembered.
    async fn set_favorite(&self, station_id: &str, favorite: bool) -> Result<()>;

    async fn is_favorite(&self, station_id: &str) -> Result<bool>;

    /// Most recently played first.
    async fn recent_history(&self, limit: u32) -> Result<Vec<HistoryEntry>>;

    /// Live favorites list; the receiver always holds the latest snapshot.
    fn favorites(&self) -> watch::Receiver<Vec<Station>>;

    /// Latest stored snapshot of a station.
    async fn station(&self, station_id: &str) -> Result<Option<Station>>;

    /// Persist a station snapshot without touching history.
    async fn remember_station(&self, station: &Station) -> Result<()>;
}

#[derive(FromRow)]
struct HistoryRow {
    #[sqlx(flatten)]
    station: Station,
    last_played_at: i64,
    play_count: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        HistoryEntry {
            station: row.station,
            last_played_at: DateTime::<Utc>::from_timestamp_millis(row.last_played_at)
                .unwrap_or_default(),
            play_count: u32::try_from(row.play_count).unwrap_or(u32::MAX),
        }
    }
}

/// SQLite implementation of [`HistoryFavoritesStore`]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    favorites_tx: watch::Sender<Vec<Station>>,
}

impl SqliteHistoryStore {
    /// Open the store on a migrated pool and load the current favorites.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        Self::with_clock(pool, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self> {
        let (favorites_tx, _) = watch::channel(Vec::new());
        let store = Self {
            pool,
            clock,
            favorites_tx,
        };
        store.refresh_favorites().await?;
        Ok(store)
    }

    async fn load_favorites(&self) -> Result<Vec<Station>> {
        let stations = query_as::<_, Station>(
            r#"
            SELECT s.id, s.name, s.stream_url, s.icon_url, s.genre, s.country, s.language
            FROM favorites f
            JOIN stations s ON s.id = f.station_id
            ORDER BY f.added_at ASC, s.name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(stations)
    }

    async fn refresh_favorites(&self) -> Result<()> {
        let favorites = self.load_favorites().await?;
        self.favorites_tx.send_replace(favorites);
        Ok(())
    }

    async fn upsert_station<'e, E>(&self, executor: E, station: &Station) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        station
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "Station".to_string(),
                message,
            })?;

        query(
            r#"
            INSERT INTO stations (
                id, name, stream_url, icon_url, genre, country, language, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                stream_url = excluded.stream_url,
                icon_url = excluded.icon_url,
                genre = excluded.genre,
                country = excluded.country,
                language = excluded.language,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&station.id)
        .bind(&station.name)
        .bind(&station.stream_url)
        .bind(&station.icon_url)
        .bind(&station.genre)
        .bind(&station.country)
        .bind(&station.language)
        .bind(self.clock.unix_timestamp_millis())
        .execute(executor)
        .await?;

        Ok(())
    }

    async fn is_favorite_inner(&self, station_id: &str) -> Result<bool> {
        let row: Option<(String,)> = query_as("SELECT station_id FROM favorites WHERE station_id = ?")
            .bind(station_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }
}

#[async_trait]
impl HistoryFavoritesStore for SqliteHistoryStore {
    #[instrument(skip(self, station), fields(station_id = %station.id))]
    async fn record_play(&self, station: &Station) -> Result<()> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        self.upsert_station(&mut *tx, station).await?;

        query(
            r#"
            INSERT INTO play_history (station_id, last_played_at, play_count)
            VALUES (?, ?, 1)
            ON CONFLICT(station_id) DO UPDATE SET
                last_played_at = excluded.last_played_at,
                play_count = play_history.play_count + 1
            "#,
        )
        .bind(&station.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Recorded play");

        // The snapshot may have renamed a favorite.
        if self.is_favorite_inner(&station.id).await? {
            self.refresh_favorites().await?;
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_favorite(&self, station_id: &str, favorite: bool) -> Result<()> {
        if favorite {
            let known = self.station(station_id).await?.is_some();
            if !known {
                return Err(LibraryError::NotFound {
                    entity_type: "Station".to_string(),
                    id: station_id.to_string(),
                });
            }

            query("INSERT OR IGNORE INTO favorites (station_id, added_at) VALUES (?, ?)")
                .bind(station_id)
                .bind(self.clock.unix_timestamp_millis())
                .execute(&self.pool)
                .await?;
        } else {
            query("DELETE FROM favorites WHERE station_id = ?")
                .bind(station_id)
                .execute(&self.pool)
                .await?;
        }

        self.refresh_favorites().await
    }

    async fn is_favorite(&self, station_id: &str) -> Result<bool> {
        self.is_favorite_inner(station_id).await
    }

    async fn recent_history(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        let rows = query_as::<_, HistoryRow>(
            r#"
            SELECT s.id, s.name, s.stream_url, s.icon_url, s.genre, s.country, s.language,
                   h.last_played_at, h.play_count
            FROM play_history h
            JOIN stations s ON s.id = h.station_id
            ORDER BY h.last_played_at DESC, h.play_count DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    fn favorites(&self) -> watch::Receiver<Vec<Station>> {
        self.favorites_tx.subscribe()
    }

    async fn station(&self, station_id: &str) -> Result<Option<Station>> {
        let station = query_as::<_, Station>(
            r#"
            SELECT id, name, stream_url, icon_url, genre, country, language
            FROM stations WHERE id = ?
            "#,
        )
        .bind(station_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(station)
    }

    async fn remember_station(&self, station: &Station) -> Result<()> {
        self.upsert_station(&self.pool, station).await?;

        if self.is_favorite_inner(&station.id).await? {
            self.refresh_favorites().await?;
        }

        Ok(())
    }
}
