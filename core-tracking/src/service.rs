//! Push-or-defer entry point for tracker progress.

use crate::error::{Result, TrackingError};
use crate::job::{DeliveryOutcome, DELAYED_TRACKING_TASK};
use crate::store::DeferredUpdateStore;
use crate::tracker::TrackerClient;
use bridge_traits::{
    BackgroundExecutor, BackoffPolicy, ExistingTaskPolicy, OneTimeTaskRequest, TaskConstraints,
};
use core_library::models::validate_progress;
use core_library::TrackRepository;
use core_runtime::config::TrackingSettings;
use core_runtime::events::{CoreEvent, EventBus, TrackingEvent};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Mirrors local progress to trackers, queueing what cannot be delivered.
pub struct TrackingService {
    tracks: Arc<dyn TrackRepository>,
    tracker: Arc<dyn TrackerClient>,
    store: Arc<dyn DeferredUpdateStore>,
    executor: Option<Arc<dyn BackgroundExecutor>>,
    settings: TrackingSettings,
    event_bus: EventBus,
}

impl TrackingService {
    pub fn new(
        tracks: Arc<dyn TrackRepository>,
        tracker: Arc<dyn TrackerClient>,
        store: Arc<dyn DeferredUpdateStore>,
        executor: Option<Arc<dyn BackgroundExecutor>>,
        settings: TrackingSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            tracks,
            tracker,
            store,
            executor,
            settings,
            event_bus,
        }
    }

    /// Push `progress` for a track, deferring it to the retry job on failure.
    ///
    /// # Errors
    /// - `InvalidProgress` for negative or non-finite values
    /// - `Library` / `Database` if the track or pending store cannot be read
    ///   or written
    #[instrument(skip(self))]
    pub async fn update_progress(&self, track_id: i64, progress: f64) -> Result<DeliveryOutcome> {
        validate_progress(progress).map_err(TrackingError::InvalidProgress)?;

        let Some(track) = self.tracks.find_by_id(track_id).await? else {
            debug!("Track not found, nothing to push");
            return Ok(DeliveryOutcome::Orphaned);
        };

        match self.tracker.push_progress(&track, progress).await {
            Ok(()) => {
                self.tracks.update_progress(track.id, progress).await?;
                // An older deferred value must not be redelivered over this one
                if self.store.remove(track_id).await? {
                    debug!("Dropped superseded pending update");
                }
                self.emit(TrackingEvent::Delivered { track_id, progress });
                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) => {
                warn!(error = %e, "Tracker push failed, deferring");
                self.store.put(track_id, progress).await?;
                self.emit(TrackingEvent::Deferred { track_id, progress });
                self.schedule_retry().await;
                Ok(DeliveryOutcome::Deferred)
            }
        }
    }

    /// Number of updates waiting for the retry job
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.store.get_all().await?.len())
    }

    /// Request the retry job, superseding any instance already pending.
    ///
    /// The update is already stored, so scheduling failures are only logged;
    /// the next deferral schedules again.
    pub async fn schedule_retry(&self) {
        let Some(executor) = &self.executor else {
            warn!("No background executor; deferred tracker updates wait for the next schedule");
            return;
        };

        let constraints = if self.settings.requires_network {
            TaskConstraints::default()
        } else {
            TaskConstraints::none()
        };
        let request = OneTimeTaskRequest::new(DELAYED_TRACKING_TASK)
            .with_constraints(constraints)
            .with_backoff(BackoffPolicy::exponential(self.settings.backoff_base))
            .with_existing_policy(ExistingTaskPolicy::Replace);

        match executor.enqueue_unique(request).await {
            Ok(task_id) => info!(%task_id, "Scheduled delayed tracking update"),
            Err(e) => error!(error = %e, "Failed to schedule delayed tracking update"),
        }
    }

    fn emit(&self, event: TrackingEvent) {
        let _ = self.event_bus.emit(CoreEvent::Tracking(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DelayedTrackingJob;
    use crate::store::SqliteDeferredUpdateStore;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, FixedClock, TaskHandler, TaskId, TaskOutcome, TaskStatus};
    use core_library::db::create_test_pool;
    use core_library::{
        EntryRepository, LibraryEntry, ProviderId, SqliteEntryRepository, SqliteTrackRepository,
        Track,
    };
    use mockall::mock;
    use std::sync::Mutex;
    use std::time::Duration;

    mock! {
        Tracker {}

        #[async_trait]
        impl TrackerClient for Tracker {
            async fn push_progress(&self, track: &Track, progress: f64) -> Result<()>;
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        requests: Mutex<Vec<OneTimeTaskRequest>>,
    }

    #[async_trait]
    impl BackgroundExecutor for RecordingExecutor {
        async fn register_handler(
            &self,
            _task_id: &str,
            _handler: Arc<dyn TaskHandler>,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }

        async fn schedule_task(
            &self,
            task_id: &str,
            _interval: Duration,
            _constraints: TaskConstraints,
        ) -> bridge_traits::error::Result<TaskId> {
            Ok(TaskId::new(task_id))
        }

        async fn enqueue_unique(
            &self,
            request: OneTimeTaskRequest,
        ) -> bridge_traits::error::Result<TaskId> {
            let id = TaskId::new(request.task_id.clone());
            self.requests.lock().unwrap().push(request);
            Ok(id)
        }

        async fn cancel_task(&self, _task_id: &TaskId) -> bridge_traits::error::Result<()> {
            Ok(())
        }

        async fn get_task_status(&self, task_id: &TaskId) -> bridge_traits::error::Result<TaskStatus> {
            Err(BridgeError::TaskNotFound(task_id.to_string()))
        }

        async fn list_tasks(&self) -> bridge_traits::error::Result<Vec<TaskId>> {
            Ok(Vec::new())
        }

        async fn next_execution_time(
            &self,
            _task_id: &TaskId,
        ) -> bridge_traits::error::Result<Option<Duration>> {
            Ok(None)
        }
    }

    struct Fixture {
        tracks: Arc<SqliteTrackRepository>,
        store: Arc<SqliteDeferredUpdateStore>,
        executor: Arc<RecordingExecutor>,
        track_id: i64,
    }

    async fn fixture() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        let entry_id = SqliteEntryRepository::new(pool.clone())
            .insert(&LibraryEntry::new(ProviderId(1), "/show", "Show"))
            .await
            .unwrap();

        let tracks = Arc::new(SqliteTrackRepository::new(pool.clone()));
        let track_id = tracks
            .insert(&Track {
                id: 0,
                entry_id,
                tracker_id: 2,
                remote_id: 77,
                library_id: None,
                title: "Show".to_string(),
                last_progress: 1.0,
                total_units: 12,
                status: 1,
                score: 0.0,
                remote_url: String::new(),
                start_date: 0,
                finish_date: 0,
            })
            .await
            .unwrap();

        Fixture {
            tracks,
            store: Arc::new(SqliteDeferredUpdateStore::new(pool, Arc::new(FixedClock::at_millis(5)))),
            executor: Arc::new(RecordingExecutor::default()),
            track_id,
        }
    }

    fn service(f: &Fixture, tracker: MockTracker) -> TrackingService {
        TrackingService::new(
            f.tracks.clone(),
            Arc::new(tracker),
            f.store.clone(),
            Some(f.executor.clone()),
            TrackingSettings::default(),
            EventBus::new(16),
        )
    }

    #[tokio::test]
    async fn test_successful_push_updates_local_track() {
        let f = fixture().await;
        let mut tracker = MockTracker::new();
        tracker.expect_push_progress().times(1).returning(|_, _| Ok(()));

        let outcome = service(&f, tracker).update_progress(f.track_id, 4.0).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(f.tracks.find_by_id(f.track_id).await.unwrap().unwrap().last_progress, 4.0);
        assert!(f.store.get_all().await.unwrap().is_empty());
        assert!(f.executor.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_defers_and_replaces_retry() {
        let f = fixture().await;
        let mut tracker = MockTracker::new();
        tracker
            .expect_push_progress()
            .times(2)
            .returning(|_, _| Err(TrackingError::Tracker("offline".to_string())));
        let service = service(&f, tracker);

        service.update_progress(f.track_id, 4.0).await.unwrap();
        let outcome = service.update_progress(f.track_id, 6.0).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Deferred);
        assert_eq!(service.pending_count().await.unwrap(), 1);
        assert_eq!(f.store.get_all().await.unwrap()[0].progress, 6.0);
        assert_eq!(f.tracks.find_by_id(f.track_id).await.unwrap().unwrap().last_progress, 1.0);

        let requests = f.executor.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].task_id, DELAYED_TRACKING_TASK);
        assert_eq!(requests[0].existing, ExistingTaskPolicy::Replace);
        assert_eq!(
            requests[0].backoff,
            Some(BackoffPolicy::exponential(Duration::from_secs(300)))
        );
        assert!(requests[0].constraints.requires_network);
    }

    #[tokio::test]
    async fn test_successful_push_supersedes_pending_update() {
        let f = fixture().await;
        let mut tracker = MockTracker::new();
        let mut calls = 0;
        tracker.expect_push_progress().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(TrackingError::Tracker("timeout".to_string()))
            } else {
                Ok(())
            }
        });
        let service = service(&f, tracker);

        assert_eq!(
            service.update_progress(f.track_id, 5.0).await.unwrap(),
            DeliveryOutcome::Deferred
        );
        assert_eq!(
            service.update_progress(f.track_id, 7.0).await.unwrap(),
            DeliveryOutcome::Delivered
        );
        assert_eq!(service.pending_count().await.unwrap(), 0);

        // The retry job must not push the stale 5.0
        let mut retry_tracker = MockTracker::new();
        retry_tracker.expect_push_progress().times(0);
        let job = DelayedTrackingJob::new(
            f.store.clone(),
            f.tracks.clone(),
            Arc::new(retry_tracker),
            EventBus::new(16),
            3,
        );

        assert_eq!(job.attempt(0).await.unwrap(), TaskOutcome::Success);
        assert_eq!(f.tracks.find_by_id(f.track_id).await.unwrap().unwrap().last_progress, 7.0);
    }

    #[tokio::test]
    async fn test_missing_track_is_skipped() {
        let f = fixture().await;
        let mut tracker = MockTracker::new();
        tracker.expect_push_progress().times(0);

        let outcome = service(&f, tracker).update_progress(999, 4.0).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Orphaned);
    }

    #[tokio::test]
    async fn test_invalid_progress_rejected() {
        let f = fixture().await;
        let mut tracker = MockTracker::new();
        tracker.expect_push_progress().times(0);

        let result = service(&f, tracker).update_progress(f.track_id, -2.0).await;
        assert!(matches!(result, Err(TrackingError::InvalidProgress(_))));
    }
}
