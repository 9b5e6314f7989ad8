//! Workspace façade crate.
//!
//! Host applications can depend on `libsync-workspace` and get the bootstrap
//! façade plus the refresh and tracking engines without wiring each crate
//! individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreError, SyncEngine};

#[cfg(feature = "desktop-shims")]
pub use core_sync::{MetadataRefreshJob, RefreshService, RefreshSummary};

#[cfg(feature = "desktop-shims")]
pub use core_tracking::{DelayedTrackingJob, TrackingService};
