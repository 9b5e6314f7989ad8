//! Metadata provider contract and registry

use crate::error::Result;
use async_trait::async_trait;
use core_library::{LibraryEntry, ProviderId, RemoteMetadata};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A remote (or local filesystem) source of entry metadata.
///
/// Implementations own their transport, including timeouts; the refresh
/// engine never times out a fetch on its own.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Fetch the current metadata snapshot for `entry`
    async fn fetch_metadata(&self, entry: &LibraryEntry) -> Result<RemoteMetadata>;
}

/// Resolves provider handles by id.
///
/// `None` means the provider was removed or disabled; entries belonging to
/// it are skipped without error.
pub trait ProviderRegistry: Send + Sync {
    fn resolve(&self, provider_id: ProviderId) -> Option<Arc<dyn MetadataProvider>>;
}

/// In-memory registry populated by the host at startup
#[derive(Default)]
pub struct StaticProviderRegistry {
    providers: RwLock<HashMap<ProviderId, Arc<dyn MetadataProvider>>>,
}

impl StaticProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own id, replacing any previous one
    pub fn register(&self, provider: Arc<dyn MetadataProvider>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.id(), provider);
    }

    /// Remove a provider; returns whether it was registered
    pub fn unregister(&self, provider_id: ProviderId) -> bool {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&provider_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProviderRegistry for StaticProviderRegistry {
    fn resolve(&self, provider_id: ProviderId) -> Option<Arc<dyn MetadataProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider_id)
            .cloned()
    }
}
