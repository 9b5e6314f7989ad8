//! # Core Configuration Module
//!
//! Typed configuration for the sync engine, built with a builder and
//! validated up front so misconfiguration fails at startup instead of in the
//! middle of a refresh run.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncEngineConfig;
//! use std::time::Duration;
//!
//! let config = SyncEngineConfig::builder()
//!     .database_path("/path/to/library.db")
//!     .cover_cache_dir("/path/to/covers")
//!     .max_concurrent_providers(5)
//!     .refresh_interval(Duration::from_secs(12 * 60 * 60))
//!     .tracking_max_attempts(3)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! When the `desktop-shims` feature is enabled a Tokio background executor
//! (with a desktop network monitor) is injected if none is provided.

use crate::error::{Error, Result};
use bridge_traits::{BackgroundExecutor, NetworkMonitor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Shortest periodic refresh interval accepted
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Metadata refresh knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Provider partitions allowed to run at once
    pub max_concurrent_providers: usize,
    /// Treat runs as forced refreshes (re-download covers even when the URL is unchanged)
    pub manual_fetch: bool,
    /// Warn when a single provider has more entries than this in one run
    pub provider_queue_warning_threshold: usize,
    /// Periodic refresh interval; `None` means manual trigger only
    pub interval: Option<Duration>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            max_concurrent_providers: 5,
            manual_fetch: true,
            provider_queue_warning_threshold: 60,
            interval: None,
        }
    }
}

/// Deferred tracker update knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSettings {
    /// Attempts after which the retry job gives up
    pub max_attempts: u32,
    /// Base delay of the exponential retry backoff
    pub backoff_base: Duration,
    /// Only run the retry job while a network connection is available
    pub requires_network: bool,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5 * 60),
            requires_network: true,
        }
    }
}

/// Sync engine configuration.
///
/// Use [`SyncEngineConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct SyncEngineConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// Directory holding cached cover images
    pub cover_cache_dir: PathBuf,
    pub refresh: RefreshSettings,
    pub tracking: TrackingSettings,
    /// Event bus buffer size
    pub event_buffer_size: usize,
    /// Job scheduling collaborator (required for periodic refresh and tracker retries)
    pub background_executor: Option<Arc<dyn BackgroundExecutor>>,
    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
}

impl std::fmt::Debug for SyncEngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngineConfig")
            .field("database_path", &self.database_path)
            .field("cover_cache_dir", &self.cover_cache_dir)
            .field("refresh", &self.refresh)
            .field("tracking", &self.tracking)
            .field("event_buffer_size", &self.event_buffer_size)
            .field(
                "background_executor",
                &self
                    .background_executor
                    .as_ref()
                    .map(|_| "BackgroundExecutor { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .finish()
    }
}

impl SyncEngineConfig {
    pub fn builder() -> SyncEngineConfigBuilder {
        SyncEngineConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path and cover cache directory are not empty
    /// - Concurrency and warning thresholds are at least 1
    /// - The periodic refresh interval is not shorter than 15 minutes
    /// - The retry backoff base is positive and within the backoff cap
    /// - Periodic refresh has an executor to run on
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cover_cache_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Cover cache directory cannot be empty".to_string(),
            ));
        }

        if self.refresh.max_concurrent_providers == 0 {
            return Err(Error::Config(
                "max_concurrent_providers must be at least 1".to_string(),
            ));
        }

        if self.refresh.provider_queue_warning_threshold == 0 {
            return Err(Error::Config(
                "provider_queue_warning_threshold must be at least 1".to_string(),
            ));
        }

        if let Some(interval) = self.refresh.interval {
            if interval < MIN_REFRESH_INTERVAL {
                return Err(Error::Config(format!(
                    "Refresh interval must be at least {} minutes",
                    MIN_REFRESH_INTERVAL.as_secs() / 60
                )));
            }
        }

        if self.tracking.backoff_base.is_zero() {
            return Err(Error::Config(
                "Tracking backoff base must be greater than zero".to_string(),
            ));
        }

        if self.tracking.backoff_base > bridge_traits::BackoffPolicy::MAX_DELAY {
            return Err(Error::Config(
                "Tracking backoff base exceeds the maximum backoff delay of 5 hours".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        if self.refresh.interval.is_some() && self.background_executor.is_none() {
            return Err(Error::Config(
                "Periodic refresh enabled but no BackgroundExecutor provided. \
                 Remove the refresh interval or inject a BackgroundExecutor implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_executor(
    monitor: Option<Arc<dyn NetworkMonitor>>,
) -> (Arc<dyn BackgroundExecutor>, Arc<dyn NetworkMonitor>) {
    use bridge_desktop::{DesktopNetworkMonitor, TokioBackgroundExecutor};

    let monitor = monitor.unwrap_or_else(|| Arc::new(DesktopNetworkMonitor::new()));
    let executor: Arc<dyn BackgroundExecutor> = Arc::new(
        TokioBackgroundExecutor::with_network_monitor(Some(Arc::clone(&monitor))),
    );
    (executor, monitor)
}

/// Builder for [`SyncEngineConfig`].
#[derive(Default)]
pub struct SyncEngineConfigBuilder {
    database_path: Option<PathBuf>,
    cover_cache_dir: Option<PathBuf>,
    refresh: RefreshSettings,
    tracking: TrackingSettings,
    event_buffer_size: Option<usize>,
    background_executor: Option<Arc<dyn BackgroundExecutor>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
}

impl SyncEngineConfigBuilder {
    /// Sets the SQLite database path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the cover cache directory (required).
    pub fn cover_cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cover_cache_dir = Some(path.into());
        self
    }

    /// Number of provider partitions refreshed concurrently. Default: 5
    pub fn max_concurrent_providers(mut self, permits: usize) -> Self {
        self.refresh.max_concurrent_providers = permits;
        self
    }

    /// Whether refresh runs force cover re-downloads. Default: true
    pub fn manual_fetch(mut self, manual_fetch: bool) -> Self {
        self.refresh.manual_fetch = manual_fetch;
        self
    }

    /// Per-provider queue length that triggers a warning. Default: 60
    pub fn provider_queue_warning_threshold(mut self, threshold: usize) -> Self {
        self.refresh.provider_queue_warning_threshold = threshold;
        self
    }

    /// Enables periodic refresh on the background executor.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh.interval = Some(interval);
        self
    }

    /// Retry job attempt budget. Default: 3
    pub fn tracking_max_attempts(mut self, max_attempts: u32) -> Self {
        self.tracking.max_attempts = max_attempts;
        self
    }

    /// Base delay of the retry job's exponential backoff. Default: 5 minutes
    pub fn tracking_backoff_base(mut self, base: Duration) -> Self {
        self.tracking.backoff_base = base;
        self
    }

    /// Whether the retry job waits for connectivity. Default: true
    pub fn tracking_requires_network(mut self, requires_network: bool) -> Self {
        self.tracking.requires_network = requires_network;
        self
    }

    /// Event bus buffer size. Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn background_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.background_executor = Some(executor);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required path is missing or a value
    /// fails [`SyncEngineConfig::validate`].
    pub fn build(self) -> Result<SyncEngineConfig> {
        let database_path = self
            .database_path
            .ok_or_else(|| Error::Config("Database path is required".to_string()))?;

        let cover_cache_dir = self
            .cover_cache_dir
            .ok_or_else(|| Error::Config("Cover cache directory is required".to_string()))?;

        #[cfg(feature = "desktop-shims")]
        let (background_executor, network_monitor) = match self.background_executor {
            Some(executor) => (Some(executor), self.network_monitor),
            None => {
                let (executor, monitor) = provide_default_executor(self.network_monitor);
                (Some(executor), Some(monitor))
            }
        };

        #[cfg(not(feature = "desktop-shims"))]
        let (background_executor, network_monitor) =
            (self.background_executor, self.network_monitor);

        let config = SyncEngineConfig {
            database_path,
            cover_cache_dir,
            refresh: self.refresh,
            tracking: self.tracking,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            background_executor,
            network_monitor,
        };

        config.validate()?;
        Ok(config)
    }
}
