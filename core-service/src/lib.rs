//! Core service façade and bootstrap.
//!
//! [`SyncEngine::bootstrap`] turns a validated [`SyncEngineConfig`] into a
//! running engine: it opens the library database, builds the repositories,
//! cover cache and event bus, and registers the refresh and tracker retry
//! handlers with the host's background executor. Desktop apps enable the
//! `desktop-shims` feature to get a Tokio executor when the host provides
//! none.

pub mod error;

pub use error::{CoreError, Result};

use async_trait::async_trait;
use bridge_traits::{
    BackgroundExecutor, SystemClock, TaskConstraints, TaskContext, TaskHandler, TaskId,
    TaskOutcome,
};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{
    EntryRepository, FsCoverCache, SqliteEntryRepository, SqliteTrackRepository, TrackRepository,
};
use core_runtime::config::SyncEngineConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream};
use core_sync::{
    EventBusProgressReporter, MetadataRefreshJob, ProviderRegistry, Reconciler, RefreshService,
    SyncError,
};
use core_tracking::{
    DelayedTrackingJob, SqliteDeferredUpdateStore, TrackerClient, TrackingService,
    DELAYED_TRACKING_TASK,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Task name of the periodic metadata refresh
pub const METADATA_REFRESH_TASK: &str = "metadata_refresh";

/// Runs a refresh each time the periodic task fires.
struct RefreshTaskHandler {
    service: RefreshService,
}

#[async_trait]
impl TaskHandler for RefreshTaskHandler {
    async fn run(&self, _ctx: TaskContext) -> bridge_traits::error::Result<TaskOutcome> {
        match self.service.run_blocking().await {
            Ok(_) => Ok(TaskOutcome::Success),
            Err(SyncError::RefreshInProgress) => {
                info!("Refresh already running, skipping periodic run");
                Ok(TaskOutcome::Success)
            }
            Err(e) => {
                error!(error = %e, "Periodic metadata refresh failed");
                Ok(TaskOutcome::Failure)
            }
        }
    }
}

/// Primary façade exposed to host applications.
pub struct SyncEngine {
    config: SyncEngineConfig,
    pool: SqlitePool,
    event_bus: EventBus,
    entries: Arc<SqliteEntryRepository>,
    tracks: Arc<SqliteTrackRepository>,
    refresh: RefreshService,
    tracking: TrackingService,
}

impl SyncEngine {
    /// Open the library and wire every service.
    ///
    /// `providers` resolves metadata sources for refresh runs; `tracker`
    /// pushes progress to remote trackers.
    ///
    /// # Errors
    /// - `Config` if the configuration is invalid
    /// - `Library` if the database cannot be opened or migrated
    /// - `Bridge` if the executor rejects a handler or schedule
    #[instrument(skip_all, fields(database = %config.database_path.display()))]
    pub async fn bootstrap(
        config: SyncEngineConfig,
        providers: Arc<dyn ProviderRegistry>,
        tracker: Arc<dyn TrackerClient>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let event_bus = EventBus::new(config.event_buffer_size);
        let entries = Arc::new(SqliteEntryRepository::new(pool.clone()));
        let tracks = Arc::new(SqliteTrackRepository::new(pool.clone()));
        let cover_cache = Arc::new(FsCoverCache::new(&config.cover_cache_dir));

        let job = MetadataRefreshJob::new(
            config.refresh.clone(),
            providers,
            entries.clone(),
            Arc::new(Reconciler::new(cover_cache, Arc::new(SystemClock))),
            Arc::new(EventBusProgressReporter::new(event_bus.clone())),
        );
        let refresh = RefreshService::new(Arc::new(job), entries.clone());

        let store = Arc::new(SqliteDeferredUpdateStore::new(pool.clone(), Arc::new(SystemClock)));
        let tracking = TrackingService::new(
            tracks.clone(),
            tracker.clone(),
            store.clone(),
            config.background_executor.clone(),
            config.tracking.clone(),
            event_bus.clone(),
        );

        let engine = Self {
            pool,
            event_bus,
            entries,
            tracks,
            refresh,
            tracking,
            config,
        };

        if let Some(executor) = engine.config.background_executor.clone() {
            let retry_job = DelayedTrackingJob::new(
                store,
                engine.tracks.clone(),
                tracker,
                engine.event_bus.clone(),
                engine.config.tracking.max_attempts,
            );
            engine.register_handlers(executor.as_ref(), retry_job).await?;
        } else {
            warn!("No background executor; periodic refresh and tracker retries are disabled");
        }

        // Updates left over from a previous process
        if engine.tracking.pending_count().await? > 0 {
            engine.tracking.schedule_retry().await;
        }

        info!("Sync engine ready");
        Ok(engine)
    }

    async fn register_handlers(
        &self,
        executor: &dyn BackgroundExecutor,
        retry_job: DelayedTrackingJob,
    ) -> Result<()> {
        executor
            .register_handler(DELAYED_TRACKING_TASK, Arc::new(retry_job))
            .await?;
        executor
            .register_handler(
                METADATA_REFRESH_TASK,
                Arc::new(RefreshTaskHandler {
                    service: self.refresh.clone(),
                }),
            )
            .await?;

        if let Some(interval) = self.config.refresh.interval {
            executor
                .schedule_task(METADATA_REFRESH_TASK, interval, TaskConstraints::default())
                .await?;
            info!(interval_secs = interval.as_secs(), "Periodic metadata refresh scheduled");
        }

        Ok(())
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// Manual and periodic metadata refresh
    pub fn refresh(&self) -> &RefreshService {
        &self.refresh
    }

    /// Tracker progress delivery
    pub fn tracking(&self) -> &TrackingService {
        &self.tracking
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    /// Subscribe to refresh run events only
    pub fn refresh_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Refresh(_)))
    }

    /// Subscribe to tracker delivery events only
    pub fn tracking_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Tracking(_)))
    }

    pub fn entries(&self) -> Arc<dyn EntryRepository> {
        self.entries.clone()
    }

    pub fn tracks(&self) -> Arc<dyn TrackRepository> {
        self.tracks.clone()
    }

    /// Stop the active refresh, cancel the periodic schedule and close the
    /// database. Pending tracker updates stay stored for the next start.
    pub async fn shutdown(&self) {
        self.refresh.stop().await;

        if let Some(executor) = &self.config.background_executor {
            if self.config.refresh.interval.is_some() {
                if let Err(e) = executor.cancel_task(&TaskId::new(METADATA_REFRESH_TASK)).await {
                    warn!(error = %e, "Failed to cancel periodic refresh");
                }
            }
        }

        self.pool.close().await;
        info!("Sync engine shut down");
    }
}
