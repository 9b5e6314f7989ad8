//! # Delayed Tracking Job
//!
//! Redelivers tracker progress that failed to push. Runs as the unique
//! one-shot task [`DELAYED_TRACKING_TASK`]; the executor re-runs it with
//! exponential backoff while it returns [`TaskOutcome::Retry`].

use crate::error::Result;
use crate::store::{DeferredUpdateStore, PendingTrackUpdate};
use crate::tracker::TrackerClient;
use async_trait::async_trait;
use bridge_traits::{TaskContext, TaskHandler, TaskOutcome};
use core_library::TrackRepository;
use core_runtime::events::{CoreEvent, EventBus, TrackingEvent};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Unique task name of the retry job
pub const DELAYED_TRACKING_TASK: &str = "delayed_tracking_update";

/// What happened to one progress push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the tracker
    Delivered,
    /// Queued for the retry job
    Deferred,
    /// Track no longer exists; nothing to deliver
    Orphaned,
    /// Push failed; the pending update stays queued
    Failed,
}

pub struct DelayedTrackingJob {
    store: Arc<dyn DeferredUpdateStore>,
    tracks: Arc<dyn TrackRepository>,
    tracker: Arc<dyn TrackerClient>,
    event_bus: EventBus,
    max_attempts: u32,
}

impl DelayedTrackingJob {
    pub fn new(
        store: Arc<dyn DeferredUpdateStore>,
        tracks: Arc<dyn TrackRepository>,
        tracker: Arc<dyn TrackerClient>,
        event_bus: EventBus,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            tracks,
            tracker,
            event_bus,
            max_attempts,
        }
    }

    /// Try to deliver every pending update once.
    ///
    /// `run_attempt_count` is the number of earlier runs of this task
    /// instance. Past `max_attempts` the job gives up without touching the
    /// tracker. Otherwise it returns `Success` once the store is drained and
    /// `Retry` while anything is left.
    ///
    /// # Errors
    /// Only store failures; individual pushes never fail the job.
    #[instrument(skip(self), name = "delayed_tracking_update")]
    pub async fn attempt(&self, run_attempt_count: u32) -> Result<TaskOutcome> {
        if run_attempt_count > self.max_attempts {
            let pending = self.store.get_all().await.map(|p| p.len()).unwrap_or_default();
            warn!(
                run_attempt_count,
                max_attempts = self.max_attempts,
                pending,
                "Giving up on delayed tracker updates"
            );
            self.emit(TrackingEvent::GaveUp {
                run_attempt_count,
                pending: pending as u64,
            });
            return Ok(TaskOutcome::Failure);
        }

        for update in self.store.get_all().await? {
            self.redeliver(&update).await?;
        }

        let remaining = self.store.get_all().await?.len();
        if remaining == 0 {
            info!("All delayed tracker updates delivered");
            Ok(TaskOutcome::Success)
        } else {
            debug!(remaining, "Delayed tracker updates remain");
            Ok(TaskOutcome::Retry)
        }
    }

    async fn redeliver(&self, update: &PendingTrackUpdate) -> Result<DeliveryOutcome> {
        let track = match self.tracks.find_by_id(update.track_id).await {
            Ok(Some(track)) => track,
            Ok(None) => {
                debug!(track_id = update.track_id, "Track deleted, dropping pending update");
                self.store.remove(update.track_id).await?;
                self.emit(TrackingEvent::Orphaned {
                    track_id: update.track_id,
                });
                return Ok(DeliveryOutcome::Orphaned);
            }
            Err(e) => {
                warn!(track_id = update.track_id, error = %e, "Failed to load track");
                return Ok(DeliveryOutcome::Failed);
            }
        };

        debug!(
            track_id = track.id,
            entry_id = track.entry_id,
            progress = update.progress,
            "Updating delayed track item"
        );

        if let Err(e) = self.tracker.push_progress(&track, update.progress).await {
            warn!(track_id = track.id, error = %e, "Delayed tracker push failed");
            return Ok(DeliveryOutcome::Failed);
        }

        if let Err(e) = self.tracks.update_progress(track.id, update.progress).await {
            // Remote already has it; a concurrently deleted track is fine
            debug!(track_id = track.id, error = %e, "Local track progress not updated");
        }
        self.store.acknowledge(update).await?;
        self.emit(TrackingEvent::Delivered {
            track_id: track.id,
            progress: update.progress,
        });

        Ok(DeliveryOutcome::Delivered)
    }

    fn emit(&self, event: TrackingEvent) {
        let _ = self.event_bus.emit(CoreEvent::Tracking(event));
    }
}

#[async_trait]
impl TaskHandler for DelayedTrackingJob {
    async fn run(&self, ctx: TaskContext) -> bridge_traits::error::Result<TaskOutcome> {
        match self.attempt(ctx.run_attempt_count).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Store trouble is usually transient; the attempt ceiling still applies
                error!(error = %e, "Delayed tracking update failed");
                Ok(TaskOutcome::Retry)
            }
        }
    }
}
