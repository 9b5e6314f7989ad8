//! Domain models for the synchronized library
//!
//! Library entries are the locally cached view of a provider's catalogue
//! item. They are only ever modified through a sparse [`EntryUpdate`].

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

// =============================================================================
// ID Types
// =============================================================================

/// Identifier of a metadata provider
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ProviderId(pub i64);

impl ProviderId {
    /// The file-backed provider for user-supplied local media
    pub const LOCAL: ProviderId = ProviderId(0);

    pub fn is_local(&self) -> bool {
        *self == Self::LOCAL
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Publication status reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum EntryStatus {
    #[default]
    Unknown = 0,
    Ongoing = 1,
    Completed = 2,
    Licensed = 3,
    PublishingFinished = 4,
    Cancelled = 5,
    OnHiatus = 6,
}

/// How often a provider expects an entry's metadata to change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum UpdateStrategy {
    #[default]
    AlwaysUpdate = 0,
    OnlyFetchOnce = 1,
}

// =============================================================================
// Domain Models
// =============================================================================

/// A media item tracked in the local library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LibraryEntry {
    pub id: i64,
    pub provider_id: ProviderId,
    /// Provider-relative location of the item
    pub url: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    /// Cache-busting token for the cover image (epoch millis)
    pub cover_last_modified: Option<i64>,
    /// Committed to the user's library (as opposed to browsed)
    pub favorite: bool,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
    /// Comma separated genre list
    pub genre: Option<String>,
    pub status: EntryStatus,
    pub update_strategy: UpdateStrategy,
    /// Whether at least one remote refresh has completed
    pub initialized: bool,
}

impl LibraryEntry {
    /// Creates an entry that has never been refreshed
    pub fn new(provider_id: ProviderId, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            provider_id,
            url: url.into(),
            title: title.into(),
            thumbnail_url: None,
            cover_last_modified: None,
            favorite: false,
            author: None,
            artist: None,
            description: None,
            genre: None,
            status: EntryStatus::Unknown,
            update_strategy: UpdateStrategy::AlwaysUpdate,
            initialized: false,
        }
    }

    pub fn is_local_provider(&self) -> bool {
        self.provider_id.is_local()
    }

    /// Validate entry data
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("Entry url cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Metadata snapshot returned by a provider for one entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    /// Comma separated genre list
    pub genre: Option<String>,
    pub status: EntryStatus,
    pub update_strategy: UpdateStrategy,
}

impl RemoteMetadata {
    /// Genres split on commas, trimmed, empties dropped
    pub fn genres(&self) -> Vec<String> {
        self.genre
            .as_deref()
            .map(|genre| {
                genre
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Thumbnail URL if the provider supplied a non-empty one
    pub fn non_empty_thumbnail(&self) -> Option<&str> {
        self.thumbnail_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Sparse partial update of a [`LibraryEntry`].
///
/// `None` means "leave unchanged"; there is no way to clear a column through
/// an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub id: i64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: Option<EntryStatus>,
    pub update_strategy: Option<UpdateStrategy>,
    pub thumbnail_url: Option<String>,
    pub cover_last_modified: Option<i64>,
    pub initialized: Option<bool>,
}

impl EntryUpdate {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// True when no column would change
    pub fn is_empty(&self) -> bool {
        *self == Self::new(self.id)
    }
}

/// Link between a library entry and a remote tracker record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Track {
    pub id: i64,
    pub entry_id: i64,
    pub tracker_id: i64,
    pub remote_id: i64,
    pub library_id: Option<i64>,
    pub title: String,
    /// Last unit (episode, chapter) reported as consumed
    pub last_progress: f64,
    pub total_units: i64,
    pub status: i64,
    pub score: f64,
    pub remote_url: String,
    pub start_date: i64,
    pub finish_date: i64,
}

impl Track {
    /// Validate track data
    pub fn validate(&self) -> Result<(), String> {
        validate_progress(self.last_progress)?;
        if self.total_units < 0 {
            return Err("Track total units cannot be negative".to_string());
        }
        Ok(())
    }
}

/// Progress values must be finite and non-negative
pub fn validate_progress(progress: f64) -> Result<(), String> {
    if !progress.is_finite() || progress < 0.0 {
        return Err(format!("Progress {} must be a non-negative number", progress));
    }
    Ok(())
}
