//! # Deferred Update Store
//!
//! Durable queue of tracker progress that could not be delivered, keyed by
//! track id. Only the latest progress per track is kept; redelivering
//! history is pointless since trackers only store the furthest point.

use crate::error::{Result, TrackingError};
use async_trait::async_trait;
use bridge_traits::Clock;
use core_library::models::validate_progress;
use serde::{Deserialize, Serialize};
use sqlx::{query_as, FromRow, SqlitePool};
use std::sync::Arc;

/// A progress value waiting to be pushed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PendingTrackUpdate {
    pub track_id: i64,
    pub progress: f64,
    /// When the value was stored (milliseconds since epoch)
    pub updated_at: i64,
}

#[async_trait]
pub trait DeferredUpdateStore: Send + Sync {
    /// Store progress for a track, overwriting any pending value
    async fn put(&self, track_id: i64, progress: f64) -> Result<()>;

    /// All pending updates, oldest first
    async fn get_all(&self) -> Result<Vec<PendingTrackUpdate>>;

    /// Drop the pending update for a track; `Ok(false)` if there was none
    async fn remove(&self, track_id: i64) -> Result<bool>;

    /// Drop `update` only if it is still the pending value for its track.
    ///
    /// A newer `put` that raced with delivery stays queued.
    async fn acknowledge(&self, update: &PendingTrackUpdate) -> Result<bool>;
}

/// SQLite-backed store over the `pending_track_updates` table
pub struct SqliteDeferredUpdateStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteDeferredUpdateStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl DeferredUpdateStore for SqliteDeferredUpdateStore {
    async fn put(&self, track_id: i64, progress: f64) -> Result<()> {
        validate_progress(progress).map_err(TrackingError::InvalidProgress)?;

        sqlx::query(
            r#"
            INSERT INTO pending_track_updates (track_id, progress, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                progress = excluded.progress,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(track_id)
        .bind(progress)
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<PendingTrackUpdate>> {
        let pending = query_as::<_, PendingTrackUpdate>(
            "SELECT track_id, progress, updated_at FROM pending_track_updates ORDER BY updated_at, track_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(pending)
    }

    async fn remove(&self, track_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_track_updates WHERE track_id = ?")
            .bind(track_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn acknowledge(&self, update: &PendingTrackUpdate) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM pending_track_updates WHERE track_id = ? AND progress = ? AND updated_at = ?",
        )
        .bind(update.track_id)
        .bind(update.progress)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
