//! Library entry repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{EntryUpdate, LibraryEntry};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Library entry repository interface
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Entries the user committed to the library (favorites), grouped by
    /// provider and ordered by id within each provider
    async fn list_library_entries(&self) -> Result<Vec<LibraryEntry>>;

    /// Find an entry by its ID
    async fn find_by_id(&self, id: i64) -> Result<Option<LibraryEntry>>;

    /// Insert a new entry and return its generated ID (`entry.id` is ignored)
    ///
    /// # Errors
    /// - `InvalidInput` if the entry fails validation
    /// - `Database` if an entry with the same provider and url exists
    async fn insert(&self, entry: &LibraryEntry) -> Result<i64>;

    /// Apply a sparse update in a single statement
    ///
    /// # Errors
    /// Returns `NotFound` if the entry no longer exists
    async fn apply_update(&self, update: &EntryUpdate) -> Result<()>;

    /// Delete an entry by ID; `Ok(false)` if it was not found
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLite implementation of EntryRepository
pub struct SqliteEntryRepository {
    pool: SqlitePool,
}

impl SqliteEntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntryRepository for SqliteEntryRepository {
    async fn list_library_entries(&self) -> Result<Vec<LibraryEntry>> {
        let entries = query_as::<_, LibraryEntry>(
            "SELECT * FROM library_entries WHERE favorite = 1 ORDER BY provider_id, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<LibraryEntry>> {
        let entry = query_as::<_, LibraryEntry>("SELECT * FROM library_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    async fn insert(&self, entry: &LibraryEntry) -> Result<i64> {
        entry.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "entry".to_string(),
            message: msg,
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO library_entries (
                provider_id, url, title, thumbnail_url, cover_last_modified, favorite,
                author, artist, description, genre, status, update_strategy, initialized
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.provider_id)
        .bind(&entry.url)
        .bind(&entry.title)
        .bind(&entry.thumbnail_url)
        .bind(entry.cover_last_modified)
        .bind(entry.favorite)
        .bind(&entry.author)
        .bind(&entry.artist)
        .bind(&entry.description)
        .bind(&entry.genre)
        .bind(entry.status)
        .bind(entry.update_strategy)
        .bind(entry.initialized)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn apply_update(&self, update: &EntryUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE library_entries SET
                title = COALESCE(?, title),
                author = COALESCE(?, author),
                artist = COALESCE(?, artist),
                description = COALESCE(?, description),
                genre = COALESCE(?, genre),
                status = COALESCE(?, status),
                update_strategy = COALESCE(?, update_strategy),
                thumbnail_url = COALESCE(?, thumbnail_url),
                cover_last_modified = COALESCE(?, cover_last_modified),
                initialized = COALESCE(?, initialized)
            WHERE id = ?
            "#,
        )
        .bind(&update.title)
        .bind(&update.author)
        .bind(&update.artist)
        .bind(&update.description)
        .bind(&update.genre)
        .bind(update.status)
        .bind(update.update_strategy)
        .bind(&update.thumbnail_url)
        .bind(update.cover_last_modified)
        .bind(update.initialized)
        .bind(update.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("LibraryEntry", update.id));
        }

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM library_entries WHERE id = ?")
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
    use crate::models::{EntryStatus, ProviderId, UpdateStrategy};

    fn favorite_entry(provider: i64, url: &str) -> LibraryEntry {
        let mut entry = LibraryEntry::new(ProviderId(provider), url, format!("Title {}", url));
        entry.favorite = true;
        entry.thumbnail_url = Some("http://x/old.png".to_string());
        entry
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteEntryRepository::new(pool);

        let id = repo.insert(&favorite_entry(3, "/a")).await.unwrap();
        let found = repo.find_by_id(id).await.unwrap().unwrap();

        assert_eq!(found.id, id);
        assert_eq!(found.provider_id, ProviderId(3));
        assert_eq!(found.status, EntryStatus::Unknown);
        assert!(found.favorite);
        assert!(!found.initialized);
        assert!(repo.find_by_id(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_entry() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteEntryRepository::new(pool);

        let result = repo.insert(&favorite_entry(1, "")).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_list_library_entries_only_favorites() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteEntryRepository::new(pool);

        repo.insert(&favorite_entry(2, "/b")).await.unwrap();
        repo.insert(&favorite_entry(1, "/a")).await.unwrap();
        let mut browsing = favorite_entry(1, "/c");
        browsing.favorite = false;
        repo.insert(&browsing).await.unwrap();

        let entries = repo.list_library_entries().await.unwrap();
        let urls: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn test_apply_update_is_sparse() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteEntryRepository::new(pool);

        let mut entry = favorite_entry(1, "/a");
        entry.description = Some("kept".to_string());
        let id = repo.insert(&entry).await.unwrap();

        let update = EntryUpdate {
            author: Some("Author".to_string()),
            status: Some(EntryStatus::Completed),
            update_strategy: Some(UpdateStrategy::OnlyFetchOnce),
            cover_last_modified: Some(1_700_000_000_000),
            initialized: Some(true),
            ..EntryUpdate::new(id)
        };
        repo.apply_update(&update).await.unwrap();

        let found = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.title, "Title /a");
        assert_eq!(found.description.as_deref(), Some("kept"));
        assert_eq!(found.thumbnail_url.as_deref(), Some("http://x/old.png"));
        assert_eq!(found.author.as_deref(), Some("Author"));
        assert_eq!(found.status, EntryStatus::Completed);
        assert_eq!(found.update_strategy, UpdateStrategy::OnlyFetchOnce);
        assert_eq!(found.cover_last_modified, Some(1_700_000_000_000));
        assert!(found.initialized);
    }

    #[tokio::test]
    async fn test_apply_update_missing_entry() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteEntryRepository::new(pool);

        let id = repo.insert(&favorite_entry(1, "/a")).await.unwrap();
        assert!(repo.delete(id).await.unwrap());
        assert!(!repo.delete(id).await.unwrap());

        let err = repo.apply_update(&EntryUpdate::new(id)).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
