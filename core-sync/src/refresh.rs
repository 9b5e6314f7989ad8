//! # Metadata Refresh Job
//!
//! Refreshes the metadata of every library entry from its provider.
//!
//! ## Scheduling
//!
//! Entries are partitioned by provider. Each partition runs as one task that
//! processes its entries strictly in order, so a provider never sees more
//! than one request at a time. A semaphore bounds how many partitions run at
//! once; every partition holds its permit until it is done.
//!
//! ## Failure isolation
//!
//! Failures are per entry: an unresolvable provider skips the entry, a
//! failed fetch or write is counted and logged, and the partition moves on.
//!
//! ## Cancellation
//!
//! Cancellation is observed while waiting for a permit and between entries.
//! An in-flight fetch or write is never interrupted.

use crate::provider::ProviderRegistry;
use crate::reconcile::Reconciler;
use core_library::{EntryRepository, LibraryEntry, ProviderId};
use core_runtime::config::RefreshSettings;
use core_runtime::events::{CoreEvent, EventBus, RefreshEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Progress sink for a refresh run.
///
/// Callbacks arrive from several partition tasks concurrently; `completed`
/// is monotonic within a run.
pub trait ProgressReporter: Send + Sync {
    /// Run started with `total` entries split over `providers` partitions
    fn on_started(&self, _run_id: &str, _total: usize, _providers: usize) {}

    /// A provider has more queued entries than the warning threshold
    fn on_large_provider_queue(&self, _run_id: &str, _provider_id: ProviderId, _count: usize) {}

    /// An entry started or finished
    fn on_progress(&self, run_id: &str, in_flight: &[LibraryEntry], completed: usize, total: usize);

    /// Run finished, whether or not it was cancelled
    fn on_finished(&self, summary: &RefreshSummary);
}

/// Publishes run progress as [`RefreshEvent`]s.
pub struct EventBusProgressReporter {
    event_bus: EventBus,
}

impl EventBusProgressReporter {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }

    fn emit(&self, event: RefreshEvent) {
        // No subscribers is fine
        let _ = self.event_bus.emit(CoreEvent::Refresh(event));
    }
}

impl ProgressReporter for EventBusProgressReporter {
    fn on_started(&self, run_id: &str, total: usize, providers: usize) {
        self.emit(RefreshEvent::Started {
            run_id: run_id.to_string(),
            total: total as u64,
            providers: providers as u64,
        });
    }

    fn on_large_provider_queue(&self, run_id: &str, provider_id: ProviderId, count: usize) {
        self.emit(RefreshEvent::LargeProviderQueue {
            run_id: run_id.to_string(),
            provider_id: provider_id.0,
            entry_count: count as u64,
        });
    }

    fn on_progress(&self, run_id: &str, in_flight: &[LibraryEntry], completed: usize, total: usize) {
        self.emit(RefreshEvent::Progress {
            run_id: run_id.to_string(),
            in_flight: in_flight.iter().map(|e| e.id).collect(),
            completed: completed as u64,
            total: total as u64,
        });
    }

    fn on_finished(&self, summary: &RefreshSummary) {
        self.emit(RefreshEvent::Finished {
            run_id: summary.run_id.clone(),
            updated: summary.updated as u64,
            skipped: summary.skipped as u64,
            failed: summary.failed() as u64,
            cancelled: summary.cancelled,
        });
    }
}

/// How a single entry ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Updated,
    /// Provider no longer registered
    ProviderUnavailable,
    FetchFailed,
    PersistFailed,
}

/// Totals of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub run_id: String,
    /// Entries in the snapshot
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub fetch_failed: usize,
    pub persist_failed: usize,
    pub cancelled: bool,
}

impl RefreshSummary {
    pub fn failed(&self) -> usize {
        self.fetch_failed + self.persist_failed
    }

    /// Entries that reached a terminal outcome
    pub fn processed(&self) -> usize {
        self.updated + self.skipped + self.failed()
    }
}

/// Shared state of one run
struct RefreshRun {
    run_id: String,
    total: usize,
    completed: AtomicUsize,
    updated: AtomicUsize,
    skipped: AtomicUsize,
    fetch_failed: AtomicUsize,
    persist_failed: AtomicUsize,
    in_flight: Mutex<Vec<LibraryEntry>>,
}

impl RefreshRun {
    fn new(total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            total,
            completed: AtomicUsize::new(0),
            updated: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            fetch_failed: AtomicUsize::new(0),
            persist_failed: AtomicUsize::new(0),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    fn start_entry(&self, entry: &LibraryEntry, reporter: &dyn ProgressReporter) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.push(entry.clone());
        reporter.on_progress(
            &self.run_id,
            &in_flight,
            self.completed.load(Ordering::SeqCst),
            self.total,
        );
    }

    fn finish_entry(&self, entry: &LibraryEntry, outcome: EntryOutcome, reporter: &dyn ProgressReporter) {
        let counter = match outcome {
            EntryOutcome::Updated => &self.updated,
            EntryOutcome::ProviderUnavailable => &self.skipped,
            EntryOutcome::FetchFailed => &self.fetch_failed,
            EntryOutcome::PersistFailed => &self.persist_failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        // Completed is bumped under the lock so reported values never go backwards
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|e| e.id != entry.id);
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        reporter.on_progress(&self.run_id, &in_flight, completed, self.total);
    }

    fn summary(&self, cancelled: bool) -> RefreshSummary {
        RefreshSummary {
            run_id: self.run_id.clone(),
            total: self.total,
            updated: self.updated.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            fetch_failed: self.fetch_failed.load(Ordering::SeqCst),
            persist_failed: self.persist_failed.load(Ordering::SeqCst),
            cancelled,
        }
    }
}

/// Split entries by provider, keeping first-seen provider order and input
/// order within each partition.
pub fn partition_by_provider(entries: Vec<LibraryEntry>) -> Vec<(ProviderId, Vec<LibraryEntry>)> {
    let mut index: HashMap<ProviderId, usize> = HashMap::new();
    let mut partitions: Vec<(ProviderId, Vec<LibraryEntry>)> = Vec::new();

    for entry in entries {
        match index.get(&entry.provider_id) {
            Some(&i) => partitions[i].1.push(entry),
            None => {
                index.insert(entry.provider_id, partitions.len());
                partitions.push((entry.provider_id, vec![entry]));
            }
        }
    }

    partitions
}

/// Bounded-parallel metadata refresh over a library snapshot
pub struct MetadataRefreshJob {
    settings: RefreshSettings,
    registry: Arc<dyn ProviderRegistry>,
    entries: Arc<dyn EntryRepository>,
    reconciler: Arc<Reconciler>,
    reporter: Arc<dyn ProgressReporter>,
}

impl MetadataRefreshJob {
    pub fn new(
        settings: RefreshSettings,
        registry: Arc<dyn ProviderRegistry>,
        entries: Arc<dyn EntryRepository>,
        reconciler: Arc<Reconciler>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            settings,
            registry,
            entries,
            reconciler,
            reporter,
        }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Refresh every entry of the snapshot.
    ///
    /// Always returns a summary; per-entry failures are counted, not raised.
    #[instrument(skip(self, entries, cancel), fields(total = entries.len()), name = "metadata_refresh")]
    pub async fn run(&self, entries: Vec<LibraryEntry>, cancel: CancellationToken) -> RefreshSummary {
        let run = Arc::new(RefreshRun::new(entries.len()));
        let partitions = partition_by_provider(entries);

        info!(
            run_id = %run.run_id,
            providers = partitions.len(),
            max_concurrent = self.settings.max_concurrent_providers,
            "Starting metadata refresh"
        );
        self.reporter
            .on_started(&run.run_id, run.total, partitions.len());

        for (provider_id, partition) in &partitions {
            if partition.len() > self.settings.provider_queue_warning_threshold {
                warn!(
                    provider_id = %provider_id,
                    entry_count = partition.len(),
                    "Large provider queue; refresh may be throttled by the provider"
                );
                self.reporter
                    .on_large_provider_queue(&run.run_id, *provider_id, partition.len());
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_providers.max(1)));
        let mut handles = Vec::with_capacity(partitions.len());

        for (provider_id, partition) in partitions {
            let job = self.clone_for_task();
            let run = run.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(provider_id = %provider_id, "Cancelled before acquiring a permit");
                        return;
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                job.process_partition(provider_id, partition, &run, &cancel)
                    .await;
            });

            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Refresh partition task panicked");
            }
        }

        let summary = run.summary(cancel.is_cancelled());
        info!(
            run_id = %summary.run_id,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed(),
            cancelled = summary.cancelled,
            "Metadata refresh finished"
        );
        self.reporter.on_finished(&summary);

        summary
    }

    async fn process_partition(
        &self,
        provider_id: ProviderId,
        partition: Vec<LibraryEntry>,
        run: &RefreshRun,
        cancel: &CancellationToken,
    ) {
        debug!(provider_id = %provider_id, entries = partition.len(), "Processing provider partition");

        for entry in partition {
            if cancel.is_cancelled() {
                debug!(provider_id = %provider_id, "Partition stopped by cancellation");
                return;
            }

            run.start_entry(&entry, self.reporter.as_ref());
            let outcome = self.refresh_entry(&entry).await;
            run.finish_entry(&entry, outcome, self.reporter.as_ref());
        }
    }

    /// Fetch, reconcile and persist one entry
    pub async fn refresh_entry(&self, entry: &LibraryEntry) -> EntryOutcome {
        let Some(provider) = self.registry.resolve(entry.provider_id) else {
            debug!(entry_id = entry.id, provider_id = %entry.provider_id, "Provider unavailable, skipping");
            return EntryOutcome::ProviderUnavailable;
        };

        let remote = match provider.fetch_metadata(entry).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(
                    entry_id = entry.id,
                    provider = provider.name(),
                    error = %e,
                    "Metadata fetch failed"
                );
                return EntryOutcome::FetchFailed;
            }
        };

        let reconciliation = self
            .reconciler
            .reconcile(entry, &remote, self.settings.manual_fetch)
            .await;

        match self.entries.apply_update(&reconciliation.update).await {
            Ok(()) => EntryOutcome::Updated,
            Err(e) if e.is_not_found() => {
                debug!(entry_id = entry.id, "Entry removed during refresh");
                EntryOutcome::PersistFailed
            }
            Err(e) => {
                warn!(entry_id = entry.id, error = %e, "Failed to persist metadata update");
                EntryOutcome::PersistFailed
            }
        }
    }

    fn clone_for_task(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            registry: self.registry.clone(),
            entries: self.entries.clone(),
            reconciler: self.reconciler.clone(),
            reporter: self.reporter.clone(),
        }
    }
}
