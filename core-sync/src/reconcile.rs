//! # Reconciliation Policy
//!
//! Computes the minimal [`EntryUpdate`] between a library entry and freshly
//! fetched provider metadata.
//!
//! - The title only follows the provider while the entry is not a favorite.
//! - The cover token (`cover_last_modified`) is bumped only when the provider
//!   supplies a thumbnail and it changed (or the refresh is forced). Bumping
//!   evicts the cached image it supersedes, except for local-provider
//!   entries whose covers are user files.
//! - An empty thumbnail never overwrites a known URL.
//! - Descriptive fields are copied as-is and `initialized` is always set.
//!
//! [`compute_update`] is pure. [`Reconciler`] adds the cache lookup and
//! eviction and always evicts before it hands the update back.

use bridge_traits::Clock;
use core_library::{CoverCache, CoverKind, EntryUpdate, LibraryEntry, RemoteMetadata};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of the cover priority chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverDecision {
    /// Leave `cover_last_modified` alone
    Unchanged,
    /// Set `cover_last_modified` to now, evicting the given cached image first
    Refresh { evict: Option<CoverKind> },
}

/// Update plus the cache eviction it requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub update: EntryUpdate,
    pub cover: CoverDecision,
}

impl Reconciliation {
    pub fn eviction(&self) -> Option<CoverKind> {
        match self.cover {
            CoverDecision::Refresh { evict } => evict,
            CoverDecision::Unchanged => None,
        }
    }
}

/// Cover priority chain; the first matching rule wins.
pub fn decide_cover(
    local: &LibraryEntry,
    remote: &RemoteMetadata,
    manual_fetch: bool,
    has_custom_cover: bool,
) -> CoverDecision {
    let Some(thumbnail) = remote.non_empty_thumbnail() else {
        return CoverDecision::Unchanged;
    };

    if !manual_fetch && local.thumbnail_url.as_deref() == Some(thumbnail) {
        return CoverDecision::Unchanged;
    }

    let evict = if local.is_local_provider() {
        None
    } else if has_custom_cover {
        Some(CoverKind::Custom)
    } else {
        Some(CoverKind::Provider)
    };

    CoverDecision::Refresh { evict }
}

/// Compute the update for `local` given `remote`.
///
/// `now_millis` is only used as the cover cache-busting token.
pub fn compute_update(
    local: &LibraryEntry,
    remote: &RemoteMetadata,
    manual_fetch: bool,
    has_custom_cover: bool,
    now_millis: i64,
) -> Reconciliation {
    let cover = decide_cover(local, remote, manual_fetch, has_custom_cover);

    let title = (!remote.title.is_empty() && !local.favorite).then(|| remote.title.clone());

    let cover_last_modified = match cover {
        CoverDecision::Refresh { .. } => Some(now_millis),
        CoverDecision::Unchanged => None,
    };

    let update = EntryUpdate {
        id: local.id,
        title,
        author: remote.author.clone(),
        artist: remote.artist.clone(),
        description: remote.description.clone(),
        genre: remote.genre.clone(),
        status: Some(remote.status),
        update_strategy: Some(remote.update_strategy),
        thumbnail_url: remote.non_empty_thumbnail().map(str::to_string),
        cover_last_modified,
        initialized: Some(true),
    };

    Reconciliation { update, cover }
}

/// Applies the policy against a real cover cache.
pub struct Reconciler {
    cover_cache: Arc<dyn CoverCache>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(cover_cache: Arc<dyn CoverCache>, clock: Arc<dyn Clock>) -> Self {
        Self { cover_cache, clock }
    }

    /// Compute the update and perform the cover eviction it calls for.
    ///
    /// Cache failures are logged and never block the metadata update: the
    /// bumped `cover_last_modified` already makes the image loader refetch.
    pub async fn reconcile(
        &self,
        local: &LibraryEntry,
        remote: &RemoteMetadata,
        manual_fetch: bool,
    ) -> Reconciliation {
        let has_custom_cover = match self.cover_cache.has_custom_cover(local.id).await {
            Ok(has) => has,
            Err(e) => {
                warn!(entry_id = local.id, error = %e, "Custom cover lookup failed");
                false
            }
        };

        let reconciliation = compute_update(
            local,
            remote,
            manual_fetch,
            has_custom_cover,
            self.clock.unix_timestamp_millis(),
        );

        if let Some(kind) = reconciliation.eviction() {
            match self.cover_cache.evict_cover(local.id, kind).await {
                Ok(removed) => debug!(entry_id = local.id, ?kind, removed, "Cover evicted"),
                Err(e) => warn!(entry_id = local.id, ?kind, error = %e, "Cover eviction failed"),
            }
        }

        reconciliation
    }
}
