//! Background Execution and Task Scheduling
//!
//! Provides platform-aware scheduling of named background work. The core never
//! sleeps or re-invokes itself; it asks the host executor to run a named task
//! under a backoff policy and a conflict policy, and the task handler answers
//! with a [`TaskOutcome`] after every run.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Task execution constraints
#[derive(Debug, Clone)]
pub struct TaskConstraints {
    /// Require WiFi connection
    pub requires_wifi: bool,
    /// Require any network connection
    pub requires_network: bool,
}

impl Default for TaskConstraints {
    fn default() -> Self {
        Self {
            requires_wifi: false,
            requires_network: true,
        }
    }
}

impl TaskConstraints {
    /// Constraints for work that never touches the network
    pub fn none() -> Self {
        Self {
            requires_wifi: false,
            requires_network: false,
        }
    }
}

/// Shape of the delay curve between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Linear,
    Exponential,
}

/// Retry delay policy applied by the executor when a handler asks for a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub base_delay: Duration,
}

impl BackoffPolicy {
    /// Upper bound for any computed retry delay
    pub const MAX_DELAY: Duration = Duration::from_secs(5 * 60 * 60);

    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay,
        }
    }

    pub fn linear(base_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Linear,
            base_delay,
        }
    }

    /// Delay to wait before the run numbered `run_attempt_count`.
    ///
    /// The first run (attempt 0) is never delayed by the policy. Exponential
    /// policies wait `base * 2^(attempt - 1)`, linear ones `base * attempt`,
    /// both capped at [`Self::MAX_DELAY`].
    pub fn delay_for(&self, run_attempt_count: u32) -> Duration {
        if run_attempt_count == 0 {
            return Duration::ZERO;
        }

        let delay = match self.kind {
            BackoffKind::Linear => self.base_delay.checked_mul(run_attempt_count),
            BackoffKind::Exponential => 2u32
                .checked_pow(run_attempt_count - 1)
                .and_then(|factor| self.base_delay.checked_mul(factor)),
        };

        delay.unwrap_or(Self::MAX_DELAY).min(Self::MAX_DELAY)
    }
}

/// What to do when a unique task with the same name is already scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingTaskPolicy {
    /// Cancel the pending instance and schedule the new request
    Replace,
    /// Leave the pending instance alone and drop the new request
    Keep,
}

/// Request for a named one-time task
#[derive(Debug, Clone)]
pub struct OneTimeTaskRequest {
    pub task_id: String,
    pub initial_delay: Duration,
    pub constraints: TaskConstraints,
    pub backoff: Option<BackoffPolicy>,
    pub existing: ExistingTaskPolicy,
}

impl OneTimeTaskRequest {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            initial_delay: Duration::ZERO,
            constraints: TaskConstraints::default(),
            backoff: None,
            existing: ExistingTaskPolicy::Replace,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_constraints(mut self, constraints: TaskConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_existing_policy(mut self, policy: ExistingTaskPolicy) -> Self {
        self.existing = policy;
        self
    }
}

/// Scheduled task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is scheduled but not yet running
    Scheduled,
    /// Task is currently executing
    Running,
    /// Task completed successfully
    Completed,
    /// Task failed
    Failed,
    /// Task was cancelled
    Cancelled,
}

impl TaskStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Scheduled | TaskStatus::Running)
    }
}

/// Result reported by a task handler after one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Work is done; the task will not run again
    Success,
    /// Work remains; run again after the backoff delay
    Retry,
    /// Give up; the task will not run again
    Failure,
}

/// Per-run information handed to a task handler
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    /// Number of earlier runs of this task instance (0 on the first run)
    pub run_attempt_count: u32,
}

/// Work run by the executor each time a named task fires.
///
/// Mobile hosts call back into the core from their own worker entry point;
/// the desktop executor invokes the handler directly.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutcome>;
}

/// Background task executor trait
///
/// Abstracts platform-specific background task scheduling:
/// - **Android**: WorkManager unique work with backoff criteria
/// - **iOS**: BGTaskScheduler (requires user opt-in)
/// - **Desktop**: Tokio tasks inside the running process
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{BackgroundExecutor, BackoffPolicy, OneTimeTaskRequest};
/// use std::time::Duration;
///
/// async fn schedule_retry(executor: &dyn BackgroundExecutor) -> Result<()> {
///     let request = OneTimeTaskRequest::new("delayed_tracking_update")
///         .with_backoff(BackoffPolicy::exponential(Duration::from_secs(300)));
///     executor.enqueue_unique(request).await?;
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait BackgroundExecutor: Send + Sync {
    /// Bind a handler to a task name, replacing any earlier one.
    ///
    /// Must happen before the task is scheduled or enqueued.
    async fn register_handler(&self, task_id: &str, handler: Arc<dyn TaskHandler>) -> Result<()>;

    /// Schedule a recurring task
    ///
    /// # Arguments
    ///
    /// * `task_id` - Unique identifier for the task
    /// * `interval` - How often to run the task
    /// * `constraints` - Execution constraints (network, WiFi)
    async fn schedule_task(
        &self,
        task_id: &str,
        interval: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId>;

    /// Enqueue a named one-time task.
    ///
    /// At most one instance per name is pending at a time; the request's
    /// [`ExistingTaskPolicy`] decides what happens to an instance that is
    /// already scheduled or running.
    async fn enqueue_unique(&self, request: OneTimeTaskRequest) -> Result<TaskId>;

    /// Cancel a scheduled task
    async fn cancel_task(&self, task_id: &TaskId) -> Result<()>;

    /// Get status of a task
    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus>;

    /// List all scheduled tasks
    async fn list_tasks(&self) -> Result<Vec<TaskId>>;

    /// Check if background execution is available
    async fn is_available(&self) -> bool {
        true
    }

    /// Get estimated time until next execution window
    ///
    /// Returns `None` if the information is not available or if the task
    /// is not waiting for a future run.
    async fn next_execution_time(&self, task_id: &TaskId) -> Result<Option<Duration>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_constraints() {
        let constraints = TaskConstraints {
            requires_wifi: true,
            ..Default::default()
        };

        assert!(constraints.requires_wifi);
        assert!(constraints.requires_network);
        assert!(!TaskConstraints::none().requires_network);
    }

    #[test]
    fn test_task_id() {
        let id1 = TaskId::new("sync_job");
        let id2 = TaskId::new("sync_job");

        assert_eq!(id1, id2);
        assert_eq!(id1.to_string(), "sync_job");
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(300));

        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(300));
        assert_eq!(policy.delay_for(2), Duration::from_secs(600));
        assert_eq!(policy.delay_for(3), Duration::from_secs(1200));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(300));
        assert_eq!(policy.delay_for(10), BackoffPolicy::MAX_DELAY);
        assert_eq!(policy.delay_for(64), BackoffPolicy::MAX_DELAY);

        let linear = BackoffPolicy::linear(Duration::from_secs(60));
        assert_eq!(linear.delay_for(3), Duration::from_secs(180));
        assert_eq!(linear.delay_for(u32::MAX), BackoffPolicy::MAX_DELAY);
    }

    #[test]
    fn test_one_time_request_builder() {
        let request = OneTimeTaskRequest::new("delayed_tracking_update")
            .with_backoff(BackoffPolicy::exponential(Duration::from_secs(300)))
            .with_existing_policy(ExistingTaskPolicy::Keep)
            .with_constraints(TaskConstraints::none());

        assert_eq!(request.task_id, "delayed_tracking_update");
        assert_eq!(request.initial_delay, Duration::ZERO);
        assert_eq!(request.existing, ExistingTaskPolicy::Keep);
        assert!(request.backoff.is_some());
        assert!(!request.constraints.requires_network);
    }

    #[test]
    fn test_task_status_activity() {
        assert!(TaskStatus::Scheduled.is_active());
        assert!(TaskStatus::Running.is_active());
        assert!(!TaskStatus::Completed.is_active());
        assert!(!TaskStatus::Cancelled.is_active());
    }
}
