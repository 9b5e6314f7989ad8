//! Refresh run lifecycle: at most one metadata refresh at a time.

use crate::error::{Result, SyncError};
use crate::refresh::{MetadataRefreshJob, RefreshSummary};
use core_library::EntryRepository;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
}

/// Starts, stops and reports on metadata refresh runs.
///
/// Cloning shares the same run slot.
#[derive(Clone)]
pub struct RefreshService {
    job: Arc<MetadataRefreshJob>,
    entries: Arc<dyn EntryRepository>,
    active: Arc<Mutex<Option<ActiveRun>>>,
    generations: Arc<AtomicU64>,
}

impl RefreshService {
    pub fn new(job: Arc<MetadataRefreshJob>, entries: Arc<dyn EntryRepository>) -> Self {
        Self {
            job,
            entries,
            active: Arc::new(Mutex::new(None)),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start a refresh in the background.
    ///
    /// Returns `false` without side effects if a run is already active.
    pub async fn start_now(&self) -> bool {
        let Some((generation, cancel)) = self.begin().await else {
            info!("Metadata refresh already running");
            return false;
        };

        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.execute(cancel).await {
                error!(error = %e, "Metadata refresh failed");
            }
            service.end(generation).await;
        });

        true
    }

    /// Run a refresh to completion on the caller's task.
    ///
    /// # Errors
    /// - `RefreshInProgress` if another run is active
    /// - `Library` if the library snapshot cannot be read
    pub async fn run_blocking(&self) -> Result<RefreshSummary> {
        let (generation, cancel) = self.begin().await.ok_or(SyncError::RefreshInProgress)?;
        let result = self.execute(cancel).await;
        self.end(generation).await;
        result
    }

    /// Request cancellation of the active run.
    ///
    /// The run stops at the next entry boundary. Returns whether a run was
    /// active.
    pub async fn stop(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(run) => {
                info!("Stopping metadata refresh");
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    async fn begin(&self) -> Option<(u64, CancellationToken)> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return None;
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *active = Some(ActiveRun {
            generation,
            cancel: cancel.clone(),
        });
        Some((generation, cancel))
    }

    async fn end(&self, generation: u64) {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|run| run.generation) == Some(generation) {
            *active = None;
        }
    }

    async fn execute(&self, cancel: CancellationToken) -> Result<RefreshSummary> {
        let snapshot = self.entries.list_library_entries().await?;
        Ok(self.job.run(snapshot, cancel).await)
    }
}
