//! # Cover Image Cache
//!
//! On-disk cache of cover images, one file per entry and kind:
//!
//! ```text
//! <root>/provider/<entry_id>   image downloaded from the entry's thumbnail URL
//! <root>/custom/<entry_id>     image the user picked to override it
//! ```
//!
//! The refresh engine only ever evicts; downloading is done lazily by the
//! image loader on next display, keyed by the entry's `cover_last_modified`.

use crate::error::{LibraryError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which cached image of an entry to address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverKind {
    /// Image fetched from the provider's thumbnail URL
    Provider,
    /// User-supplied override
    Custom,
}

impl CoverKind {
    fn dir_name(&self) -> &'static str {
        match self {
            CoverKind::Provider => "provider",
            CoverKind::Custom => "custom",
        }
    }
}

/// Cover cache collaborator used during reconciliation
#[async_trait]
pub trait CoverCache: Send + Sync {
    /// Whether the user supplied a custom cover for the entry
    async fn has_custom_cover(&self, entry_id: i64) -> Result<bool>;

    /// Delete the cached image; `Ok(false)` if nothing was cached
    async fn evict_cover(&self, entry_id: i64, kind: CoverKind) -> Result<bool>;
}

/// Filesystem-backed cover cache
#[derive(Debug, Clone)]
pub struct FsCoverCache {
    root: PathBuf,
}

impl FsCoverCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of an entry's cached image of the given kind
    pub fn cover_path(&self, entry_id: i64, kind: CoverKind) -> PathBuf {
        self.root.join(kind.dir_name()).join(entry_id.to_string())
    }

    /// Write an image into the cache, creating directories as needed
    pub async fn store_cover(&self, entry_id: i64, kind: CoverKind, bytes: &[u8]) -> Result<()> {
        let path = self.cover_path(entry_id, kind);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| cache_error("create cover directory", &path, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| cache_error("write cover", &path, e))
    }
}

fn cache_error(action: &str, path: &Path, err: std::io::Error) -> LibraryError {
    LibraryError::CacheError(format!("Failed to {} {}: {}", action, path.display(), err))
}

#[async_trait]
impl CoverCache for FsCoverCache {
    async fn has_custom_cover(&self, entry_id: i64) -> Result<bool> {
        let path = self.cover_path(entry_id, CoverKind::Custom);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| cache_error("stat cover", &path, e))
    }

    async fn evict_cover(&self, entry_id: i64, kind: CoverKind) -> Result<bool> {
        let path = self.cover_path(entry_id, kind);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(entry_id, ?kind, "Evicted cached cover");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(cache_error("remove cover", &path, e)),
        }
    }
}
