//! Track repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{validate_progress, Track};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Tracker record repository interface
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Find a track by its ID
    ///
    /// # Returns
    /// - `Ok(Some(track))` if found
    /// - `Ok(None)` if the record was deleted
    async fn find_by_id(&self, id: i64) -> Result<Option<Track>>;

    /// Tracks linked to one library entry
    async fn find_by_entry(&self, entry_id: i64) -> Result<Vec<Track>>;

    /// Insert a new track and return its generated ID (`track.id` is ignored)
    async fn insert(&self, track: &Track) -> Result<i64>;

    /// Record progress confirmed by the remote tracker
    ///
    /// # Errors
    /// - `InvalidInput` for negative or non-finite progress
    /// - `NotFound` if the track no longer exists
    async fn update_progress(&self, id: i64, progress: f64) -> Result<()>;

    /// Delete a track by ID; `Ok(false)` if it was not found
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLite implementation of TrackRepository
pub struct SqliteTrackRepository {
    pool: SqlitePool,
}

impl SqliteTrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Track>> {
        let track = query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(track)
    }

    async fn find_by_entry(&self, entry_id: i64) -> Result<Vec<Track>> {
        let tracks = query_as::<_, Track>("SELECT * FROM tracks WHERE entry_id = ? ORDER BY id")
            .bind(entry_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(tracks)
    }

    async fn insert(&self, track: &Track) -> Result<i64> {
        track.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "track".to_string(),
            message: msg,
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO tracks (
                entry_id, tracker_id, remote_id, library_id, title,
                last_progress, total_units, status, score,
                remote_url, start_date, finish_date
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(track.entry_id)
        .bind(track.tracker_id)
        .bind(track.remote_id)
        .bind(track.library_id)
        .bind(&track.title)
        .bind(track.last_progress)
        .bind(track.total_units)
        .bind(track.status)
        .bind(track.score)
        .bind(&track.remote_url)
        .bind(track.start_date)
        .bind(track.finish_date)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_progress(&self, id: i64, progress: f64) -> Result<()> {
        validate_progress(progress).map_err(|msg| LibraryError::InvalidInput {
            field: "last_progress".to_string(),
            message: msg,
        })?;

        let result = sqlx::query("UPDATE tracks SET last_progress = ? WHERE id = ?")
            .bind(progress)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Track", id));
        }

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{LibraryEntry, ProviderId};
    use crate::repositories::{EntryRepository, SqliteEntryRepository};

    async fn insert_entry(pool: &SqlitePool) -> i64 {
        SqliteEntryRepository::new(pool.clone())
            .insert(&LibraryEntry::new(ProviderId(1), "/show", "Show"))
            .await
            .unwrap()
    }

    fn test_track(entry_id: i64, tracker_id: i64) -> Track {
        Track {
            id: 0,
            entry_id,
            tracker_id,
            remote_id: 5150,
            library_id: None,
            title: "Show".to_string(),
            last_progress: 3.0,
            total_units: 12,
            status: 1,
            score: 8.5,
            remote_url: "https://tracker.example/5150".to_string(),
            start_date: 0,
            finish_date: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let pool = create_test_pool().await.unwrap();
        let entry_id = insert_entry(&pool).await;
        let repo = SqliteTrackRepository::new(pool);

        let id = repo.insert(&test_track(entry_id, 2)).await.unwrap();
        let found = repo.find_by_id(id).await.unwrap().unwrap();

        assert_eq!(found.id, id);
        assert_eq!(found.entry_id, entry_id);
        assert_eq!(found.last_progress, 3.0);
        assert_eq!(repo.find_by_entry(entry_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_progress() {
        let pool = create_test_pool().await.unwrap();
        let entry_id = insert_entry(&pool).await;
        let repo = SqliteTrackRepository::new(pool);

        let id = repo.insert(&test_track(entry_id, 2)).await.unwrap();
        repo.update_progress(id, 7.0).await.unwrap();

        assert_eq!(repo.find_by_id(id).await.unwrap().unwrap().last_progress, 7.0);
        assert!(matches!(
            repo.update_progress(id, -1.0).await,
            Err(LibraryError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_progress_on_deleted_track() {
        let pool = create_test_pool().await.unwrap();
        let entry_id = insert_entry(&pool).await;
        let repo = SqliteTrackRepository::new(pool);

        let id = repo.insert(&test_track(entry_id, 2)).await.unwrap();
        assert!(repo.delete(id).await.unwrap());

        assert!(repo.find_by_id(id).await.unwrap().is_none());
        assert!(repo.update_progress(id, 4.0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tracks_cascade_with_entry() {
        let pool = create_test_pool().await.unwrap();
        let entry_id = insert_entry(&pool).await;
        let repo = SqliteTrackRepository::new(pool.clone());

        let id = repo.insert(&test_track(entry_id, 2)).await.unwrap();
        SqliteEntryRepository::new(pool)
            .delete(entry_id)
            .await
            .unwrap();

        assert!(repo.find_by_id(id).await.unwrap().is_none());
    }
}
