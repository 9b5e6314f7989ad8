//! # Metadata Refresh Module
//!
//! Keeps library entries in step with their providers.
//!
//! ## Components
//!
//! - **Providers** (`provider`): metadata source contract and registry
//! - **Reconciliation** (`reconcile`): field-level update policy and cover cache eviction
//! - **Refresh Job** (`refresh`): per-provider partitions under a bounded semaphore
//! - **Refresh Service** (`service`): single-run lifecycle, start/stop/status

pub mod error;
pub mod provider;
pub mod reconcile;
pub mod refresh;
pub mod service;

pub use error::{Result, SyncError};
pub use provider::{MetadataProvider, ProviderRegistry, StaticProviderRegistry};
pub use reconcile::{compute_update, decide_cover, CoverDecision, Reconciler, Reconciliation};
pub use refresh::{
    partition_by_provider, EntryOutcome, EventBusProgressReporter, MetadataRefreshJob,
    ProgressReporter, RefreshSummary,
};
pub use service::RefreshService;
