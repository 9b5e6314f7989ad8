//! Background Task Execution Implementation

use async_trait::async_trait;
use bridge_traits::{
    background::{
        BackgroundExecutor, ExistingTaskPolicy, OneTimeTaskRequest, TaskConstraints, TaskContext,
        TaskHandler, TaskId, TaskOutcome, TaskStatus,
    },
    error::{BridgeError, Result},
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
    time::{Clock, SystemClock},
};
use futures_util::{future::BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

type HandlerFn =
    Arc<dyn Fn(TaskContext) -> BoxFuture<'static, Result<TaskOutcome>> + Send + Sync>;

type TaskTable = Arc<RwLock<HashMap<TaskId, TaskInfo>>>;

/// Tokio-based background executor for desktop.
///
/// Tasks are looked up by name in a handler registry. A unique one-time task
/// keeps running until its handler reports [`TaskOutcome::Success`] or
/// [`TaskOutcome::Failure`]; a [`TaskOutcome::Retry`] re-runs it after the
/// request's backoff delay with an incremented `run_attempt_count`.
pub struct TokioBackgroundExecutor {
    tasks: TaskTable,
    handlers: Arc<RwLock<HashMap<String, HandlerFn>>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Arc<dyn Clock>,
    constraint_poll_interval: Duration,
    generations: AtomicU64,
}

struct TaskInfo {
    status: TaskStatus,
    /// Distinguishes a replaced instance from its successor under the same name
    generation: u64,
    handle: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
    run_attempt_count: u32,
    last_run: Option<i64>,
    next_run: Option<i64>,
}

/// Everything a spawned task loop needs, detached from `&self`.
#[derive(Clone)]
struct TaskRuntime {
    tasks: TaskTable,
    id: TaskId,
    generation: u64,
    handler: HandlerFn,
    constraints: TaskConstraints,
    monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl TokioBackgroundExecutor {
    /// Create a new background executor with no network monitoring.
    pub fn new() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_network_monitor_and_clock(None, clock)
    }

    /// Create a background executor with an optional network monitor.
    pub fn with_network_monitor(monitor: Option<Arc<dyn NetworkMonitor>>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_network_monitor_and_clock(monitor, clock)
    }

    /// Create a background executor with an optional network monitor and custom clock.
    pub fn with_network_monitor_and_clock(
        monitor: Option<Arc<dyn NetworkMonitor>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            network_monitor: monitor,
            clock,
            constraint_poll_interval: Duration::from_secs(5),
            generations: AtomicU64::new(0),
        }
    }

    /// How often a task blocked on constraints re-checks the network.
    pub fn with_constraint_poll_interval(mut self, interval: Duration) -> Self {
        self.constraint_poll_interval = interval;
        self
    }

    fn now_millis(clock: &dyn Clock) -> i64 {
        clock.unix_timestamp_millis()
    }

    fn duration_to_millis(duration: Duration) -> i64 {
        duration.as_millis().min(i64::MAX as u128) as i64
    }

    fn schedule_after(clock: &dyn Clock, delay: Duration) -> i64 {
        let now = Self::now_millis(clock);
        now.saturating_add(Self::duration_to_millis(delay))
    }

    fn millis_to_duration(millis: i64) -> Duration {
        if millis <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Register a handler that will be invoked when the named task executes.
    ///
    /// Registering a second handler under the same name replaces the first.
    pub async fn register_task_handler<F, Fut>(&self, task_id: &str, handler: F) -> Result<()>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<TaskOutcome>> + Send + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(
            task_id.to_string(),
            Arc::new(move |ctx| handler(ctx).boxed()),
        );
        Ok(())
    }

    async fn handler_for(&self, task_id: &str) -> Result<HandlerFn> {
        let handlers = self.handlers.read().await;
        handlers.get(task_id).cloned().ok_or_else(|| {
            BridgeError::OperationFailed(format!("No handler registered for task: {}", task_id))
        })
    }

    fn runtime(&self, id: TaskId, handler: HandlerFn, constraints: TaskConstraints) -> TaskRuntime {
        TaskRuntime {
            tasks: Arc::clone(&self.tasks),
            id,
            generation: self.generations.fetch_add(1, Ordering::SeqCst) + 1,
            handler,
            constraints,
            monitor: self.network_monitor.clone(),
            clock: Arc::clone(&self.clock),
            poll_interval: self.constraint_poll_interval,
        }
    }

    fn stop(info: &mut TaskInfo) {
        if let Some(cancel) = info.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = info.handle.take() {
            handle.abort();
        }
    }

    async fn constraints_satisfied(
        monitor: Option<&Arc<dyn NetworkMonitor>>,
        constraints: &TaskConstraints,
    ) -> bool {
        if !(constraints.requires_network || constraints.requires_wifi) {
            return true;
        }

        let Some(monitor) = monitor else {
            debug!("Network constraints requested but no monitor provided; assuming satisfied");
            return true;
        };

        match monitor.get_network_info().await {
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                network_type,
                ..
            }) => !constraints.requires_wifi || matches!(network_type, Some(NetworkType::WiFi)),
            Ok(_) => false,
            Err(err) => {
                warn!("Network monitor error: {}", err);
                false
            }
        }
    }
}

impl TaskRuntime {
    /// Apply `update` only while this instance still owns the task name.
    async fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut TaskInfo),
    {
        let mut tasks = self.tasks.write().await;
        if let Some(info) = tasks.get_mut(&self.id) {
            if info.generation == self.generation {
                update(info);
            }
        }
    }

    async fn mark_cancelled(&self) {
        self.update(|info| {
            info.status = TaskStatus::Cancelled;
            info.next_run = None;
        })
        .await;
    }

    /// Sleep for `delay`; false when cancelled first.
    async fn wait(&self, delay: Duration, cancel_rx: &mut oneshot::Receiver<()>) -> bool {
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = cancel_rx => false,
            _ = sleep(delay) => true,
        }
    }

    /// Block until constraints hold; false when cancelled first.
    async fn wait_for_constraints(&self, cancel_rx: &mut oneshot::Receiver<()>) -> bool {
        loop {
            if TokioBackgroundExecutor::constraints_satisfied(self.monitor.as_ref(), &self.constraints)
                .await
            {
                return true;
            }
            debug!(task_id = %self.id, "Constraints not satisfied; waiting");
            if !self.wait(self.poll_interval, cancel_rx).await {
                return false;
            }
        }
    }

    async fn run_once(&self, run_attempt_count: u32) -> Result<TaskOutcome> {
        self.update(|info| {
            info.status = TaskStatus::Running;
            info.run_attempt_count = run_attempt_count;
        })
        .await;

        (self.handler)(TaskContext {
            task_id: self.id.clone(),
            run_attempt_count,
        })
        .await
    }

    async fn run_unique(self, request: OneTimeTaskRequest, mut cancel_rx: oneshot::Receiver<()>) {
        let mut run_attempt_count = 0u32;
        let mut delay = request.initial_delay;

        loop {
            if !self.wait(delay, &mut cancel_rx).await
                || !self.wait_for_constraints(&mut cancel_rx).await
            {
                self.mark_cancelled().await;
                return;
            }

            let result = self.run_once(run_attempt_count).await;
            let now = TokioBackgroundExecutor::now_millis(self.clock.as_ref());

            let status = match result {
                Ok(TaskOutcome::Success) => TaskStatus::Completed,
                Ok(TaskOutcome::Failure) => {
                    info!(task_id = %self.id, run_attempt_count, "Task reported failure");
                    TaskStatus::Failed
                }
                Err(err) => {
                    warn!(task_id = %self.id, error = %err, "One-time task errored");
                    TaskStatus::Failed
                }
                Ok(TaskOutcome::Retry) => match request.backoff {
                    Some(backoff) => {
                        run_attempt_count = run_attempt_count.saturating_add(1);
                        delay = backoff.delay_for(run_attempt_count);
                        debug!(
                            task_id = %self.id,
                            run_attempt_count,
                            delay_ms = delay.as_millis() as u64,
                            "Task asked for retry"
                        );
                        self.update(|info| {
                            info.status = TaskStatus::Scheduled;
                            info.last_run = Some(now);
                            info.next_run = Some(
                                now.saturating_add(TokioBackgroundExecutor::duration_to_millis(delay)),
                            );
                        })
                        .await;
                        continue;
                    }
                    None => {
                        warn!(task_id = %self.id, "Retry requested without a backoff policy");
                        TaskStatus::Failed
                    }
                },
            };

            self.update(|info| {
                info.status = status;
                info.last_run = Some(now);
                info.next_run = None;
                info.handle = None;
                info.cancel = None;
            })
            .await;
            return;
        }
    }

    async fn run_recurring(self, period: Duration, mut cancel_rx: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(period);
        let period_millis = TokioBackgroundExecutor::duration_to_millis(period);
        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    self.mark_cancelled().await;
                    break;
                }
                _ = ticker.tick() => {
                    if !TokioBackgroundExecutor::constraints_satisfied(self.monitor.as_ref(), &self.constraints).await {
                        debug!(task_id = %self.id, "Constraints not satisfied; skipping run");
                        let next = TokioBackgroundExecutor::now_millis(self.clock.as_ref()).saturating_add(period_millis);
                        self.update(|info| info.next_run = Some(next)).await;
                        continue;
                    }

                    let result = self.run_once(0).await;

                    let now = TokioBackgroundExecutor::now_millis(self.clock.as_ref());
                    self.update(|info| {
                        info.last_run = Some(now);
                        info.next_run = Some(now.saturating_add(period_millis));
                        info.status = match result {
                            Ok(TaskOutcome::Success) => TaskStatus::Completed,
                            Ok(outcome) => {
                                debug!(task_id = %self.id, ?outcome, "Recurring run did not succeed");
                                TaskStatus::Failed
                            }
                            Err(err) => {
                                warn!(task_id = %self.id, error = %err, "Recurring task failed");
                                TaskStatus::Failed
                            }
                        };
                    })
                    .await;
                }
            }
        }
    }
}

impl Default for TokioBackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundExecutor for TokioBackgroundExecutor {
    async fn register_handler(&self, task_id: &str, handler: Arc<dyn TaskHandler>) -> Result<()> {
        self.register_task_handler(task_id, move |ctx| {
            let handler = Arc::clone(&handler);
            async move { handler.run(ctx).await }
        })
        .await
    }

    async fn schedule_task(
        &self,
        task_id: &str,
        interval: Duration,
        constraints: TaskConstraints,
    ) -> Result<TaskId> {
        let id = TaskId::new(task_id);

        debug!(
            task_id = task_id,
            interval_secs = interval.as_secs(),
            "Scheduling recurring task"
        );

        let handler = self.handler_for(task_id).await?;
        let runtime = self.runtime(id.clone(), handler, constraints);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let mut tasks = self.tasks.write().await;
        if let Some(mut previous) = tasks.remove(&id) {
            Self::stop(&mut previous);
        }
        let generation = runtime.generation;
        let handle = tokio::spawn(runtime.run_recurring(interval, cancel_rx));
        tasks.insert(
            id.clone(),
            TaskInfo {
                status: TaskStatus::Scheduled,
                generation,
                handle: Some(handle),
                cancel: Some(cancel_tx),
                run_attempt_count: 0,
                last_run: None,
                next_run: Some(Self::now_millis(self.clock.as_ref())),
            },
        );

        Ok(id)
    }

    async fn enqueue_unique(&self, request: OneTimeTaskRequest) -> Result<TaskId> {
        let id = TaskId::new(request.task_id.as_str());
        let handler = self.handler_for(&request.task_id).await?;

        // Held across the policy check and the insert so two enqueues can't interleave
        let mut tasks = self.tasks.write().await;

        if let Some(existing) = tasks.get_mut(&id) {
            if existing.status.is_active() {
                match request.existing {
                    ExistingTaskPolicy::Keep => {
                        debug!(task_id = %id, "Unique task already pending; keeping it");
                        return Ok(id);
                    }
                    ExistingTaskPolicy::Replace => {
                        debug!(task_id = %id, "Replacing pending unique task");
                        Self::stop(existing);
                    }
                }
            }
        }

        debug!(
            task_id = %id,
            delay_ms = request.initial_delay.as_millis() as u64,
            "Enqueueing unique task"
        );

        let runtime = self.runtime(id.clone(), handler, request.constraints.clone());
        let generation = runtime.generation;
        let next_run = Self::schedule_after(self.clock.as_ref(), request.initial_delay);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(runtime.run_unique(request, cancel_rx));

        tasks.insert(
            id.clone(),
            TaskInfo {
                status: TaskStatus::Scheduled,
                generation,
                handle: Some(handle),
                cancel: Some(cancel_tx),
                run_attempt_count: 0,
                last_run: None,
                next_run: Some(next_run),
            },
        );

        Ok(id)
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        debug!(task_id = %task_id, "Cancelling task");

        let mut tasks = self.tasks.write().await;
        match tasks.remove(task_id) {
            Some(mut info) => {
                Self::stop(&mut info);
                Ok(())
            }
            None => Err(BridgeError::TaskNotFound(task_id.to_string())),
        }
    }

    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus> {
        let tasks = self.tasks.read().await;
        tasks
            .get(task_id)
            .map(|info| info.status.clone())
            .ok_or_else(|| BridgeError::TaskNotFound(task_id.to_string()))
    }

    async fn list_tasks(&self) -> Result<Vec<TaskId>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.keys().cloned().collect())
    }

    async fn next_execution_time(&self, task_id: &TaskId) -> Result<Option<Duration>> {
        let tasks = self.tasks.read().await;
        let info = tasks
            .get(task_id)
            .ok_or_else(|| BridgeError::TaskNotFound(task_id.to_string()))?;

        Ok(info.next_run.map(|next| {
            let now = Self::now_millis(self.clock.as_ref());
            Self::millis_to_duration(next - now)
        }))
    }
}

impl TokioBackgroundExecutor {
    /// Run attempt count of the current (or last) run of a task
    pub async fn run_attempt_count(&self, task_id: &TaskId) -> Result<u32> {
        let tasks = self.tasks.read().await;
        tasks
            .get(task_id)
            .map(|info| info.run_attempt_count)
            .ok_or_else(|| BridgeError::TaskNotFound(task_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::background::BackoffPolicy;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;

    async fn wait_for_status(
        executor: &TokioBackgroundExecutor,
        id: &TaskId,
        expected: TaskStatus,
    ) -> bool {
        for _ in 0..100 {
            if executor.get_task_status(id).await.ok() == Some(expected.clone()) {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_background_executor_creation() {
        let executor = TokioBackgroundExecutor::new();
        assert!(executor.is_available().await);
        assert!(executor.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_task_runs_handler() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        executor
            .register_task_handler("test", move |_ctx| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(TaskOutcome::Success)
                }
            })
            .await
            .unwrap();

        let task_id = executor
            .schedule_task("test", Duration::from_millis(30), TaskConstraints::none())
            .await
            .unwrap();

        sleep(Duration::from_millis(120)).await;

        assert!(executor.get_task_status(&task_id).await.unwrap() != TaskStatus::Cancelled);
        assert!(counter.load(Ordering::SeqCst) >= 2);

        executor.cancel_task(&task_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_handler_is_rejected() {
        let executor = TokioBackgroundExecutor::new();
        let result = executor
            .enqueue_unique(OneTimeTaskRequest::new("missing"))
            .await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_unique_task_completes() {
        let executor = TokioBackgroundExecutor::new();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);

        executor
            .register_task_handler("once", move |_ctx| {
                let flag = Arc::clone(&flag_clone);
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(TaskOutcome::Success)
                }
            })
            .await
            .unwrap();

        let task_id = executor
            .enqueue_unique(
                OneTimeTaskRequest::new("once")
                    .with_initial_delay(Duration::from_millis(20))
                    .with_constraints(TaskConstraints::none()),
            )
            .await
            .unwrap();

        assert!(wait_for_status(&executor, &task_id, TaskStatus::Completed).await);
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(executor.next_execution_time(&task_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retry_increments_attempt_count_until_success() {
        let executor = TokioBackgroundExecutor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        executor
            .register_task_handler("flaky", move |ctx| {
                let seen = Arc::clone(&seen_clone);
                async move {
                    seen.lock().unwrap().push(ctx.run_attempt_count);
                    if ctx.run_attempt_count < 2 {
                        Ok(TaskOutcome::Retry)
                    } else {
                        Ok(TaskOutcome::Success)
                    }
                }
            })
            .await
            .unwrap();

        let task_id = executor
            .enqueue_unique(
                OneTimeTaskRequest::new("flaky")
                    .with_constraints(TaskConstraints::none())
                    .with_backoff(BackoffPolicy::exponential(Duration::from_millis(5))),
            )
            .await
            .unwrap();

        assert!(wait_for_status(&executor, &task_id, TaskStatus::Completed).await);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(executor.run_attempt_count(&task_id).await.unwrap(), 2);
    }

    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn run(&self, _ctx: TaskContext) -> Result<TaskOutcome> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(TaskOutcome::Success)
        }
    }

    #[tokio::test]
    async fn test_register_handler_through_trait_object() {
        let executor: Arc<dyn BackgroundExecutor> = Arc::new(TokioBackgroundExecutor::new());
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));

        executor
            .register_handler("dyn", handler.clone())
            .await
            .unwrap();

        let task_id = executor
            .enqueue_unique(OneTimeTaskRequest::new("dyn").with_constraints(TaskConstraints::none()))
            .await
            .unwrap();

        for _ in 0..100 {
            if executor.get_task_status(&task_id).await.ok() == Some(TaskStatus::Completed) {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_without_backoff_fails() {
        let executor = TokioBackgroundExecutor::new();
        executor
            .register_task_handler("no_backoff", |_ctx| async { Ok(TaskOutcome::Retry) })
            .await
            .unwrap();

        let task_id = executor
            .enqueue_unique(
                OneTimeTaskRequest::new("no_backoff").with_constraints(TaskConstraints::none()),
            )
            .await
            .unwrap();

        assert!(wait_for_status(&executor, &task_id, TaskStatus::Failed).await);
    }

    #[tokio::test]
    async fn test_failure_outcome_stops_task() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        executor
            .register_task_handler("give_up", move |_ctx| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(TaskOutcome::Failure)
                }
            })
            .await
            .unwrap();

        let task_id = executor
            .enqueue_unique(
                OneTimeTaskRequest::new("give_up")
                    .with_constraints(TaskConstraints::none())
                    .with_backoff(BackoffPolicy::exponential(Duration::from_millis(5))),
            )
            .await
            .unwrap();

        assert!(wait_for_status(&executor, &task_id, TaskStatus::Failed).await);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keep_policy_leaves_pending_task() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        executor
            .register_task_handler("keep", move |_ctx| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(TaskOutcome::Success)
                }
            })
            .await
            .unwrap();

        let request = OneTimeTaskRequest::new("keep")
            .with_initial_delay(Duration::from_millis(50))
            .with_constraints(TaskConstraints::none())
            .with_existing_policy(ExistingTaskPolicy::Keep);

        let first = executor.enqueue_unique(request.clone()).await.unwrap();
        let second = executor.enqueue_unique(request).await.unwrap();
        assert_eq!(first, second);

        assert!(wait_for_status(&executor, &first, TaskStatus::Completed).await);
        sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replace_policy_restarts_pending_task() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        executor
            .register_task_handler("replace", move |_ctx| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(TaskOutcome::Success)
                }
            })
            .await
            .unwrap();

        let slow = OneTimeTaskRequest::new("replace")
            .with_initial_delay(Duration::from_secs(60))
            .with_constraints(TaskConstraints::none());
        let id = executor.enqueue_unique(slow).await.unwrap();

        let fast = OneTimeTaskRequest::new("replace")
            .with_initial_delay(Duration::from_millis(10))
            .with_constraints(TaskConstraints::none());
        executor.enqueue_unique(fast).await.unwrap();

        assert!(wait_for_status(&executor, &id, TaskStatus::Completed).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(executor.list_tasks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_task() {
        let executor = TokioBackgroundExecutor::new();
        executor
            .register_task_handler("cancel", |_ctx| async { Ok(TaskOutcome::Success) })
            .await
            .unwrap();

        let task_id = executor
            .schedule_task("cancel", Duration::from_secs(1), TaskConstraints::none())
            .await
            .unwrap();

        executor.cancel_task(&task_id).await.unwrap();
        assert!(matches!(
            executor.get_task_status(&task_id).await,
            Err(BridgeError::TaskNotFound(_))
        ));
        assert!(executor.cancel_task(&task_id).await.is_err());
    }

    #[tokio::test]
    async fn test_network_constraints() {
        let connected = Arc::new(AtomicBool::new(false));
        let monitor =
            Arc::new(TestNetworkMonitor::new(Arc::clone(&connected))) as Arc<dyn NetworkMonitor>;
        let executor = TokioBackgroundExecutor::with_network_monitor(Some(monitor))
            .with_constraint_poll_interval(Duration::from_millis(10));

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        executor
            .register_task_handler("network", move |_ctx| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(TaskOutcome::Success)
                }
            })
            .await
            .unwrap();

        let task_id = executor
            .enqueue_unique(OneTimeTaskRequest::new("network"))
            .await
            .unwrap();

        sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(
            executor.get_task_status(&task_id).await.unwrap(),
            TaskStatus::Scheduled
        );

        connected.store(true, Ordering::SeqCst);
        assert!(wait_for_status(&executor, &task_id, TaskStatus::Completed).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wifi_constraint_rejects_other_networks() {
        let connected = Arc::new(AtomicBool::new(true));
        let monitor = Arc::new(TestNetworkMonitor::new(connected)) as Arc<dyn NetworkMonitor>;

        let wifi = TaskConstraints {
            requires_wifi: true,
            ..Default::default()
        };
        assert!(TokioBackgroundExecutor::constraints_satisfied(Some(&monitor), &wifi).await);

        let offline = Arc::new(TestNetworkMonitor::new(Arc::new(AtomicBool::new(false))))
            as Arc<dyn NetworkMonitor>;
        assert!(!TokioBackgroundExecutor::constraints_satisfied(Some(&offline), &wifi).await);
        assert!(
            TokioBackgroundExecutor::constraints_satisfied(Some(&offline), &TaskConstraints::none())
                .await
        );
    }

    #[derive(Clone)]
    struct TestNetworkMonitor {
        connected: Arc<AtomicBool>,
    }

    impl TestNetworkMonitor {
        fn new(connected: Arc<AtomicBool>) -> Self {
            Self { connected }
        }
    }

    #[async_trait]
    impl NetworkMonitor for TestNetworkMonitor {
        async fn get_network_info(&self) -> Result<NetworkInfo> {
            if self.connected.load(Ordering::SeqCst) {
                Ok(NetworkInfo {
                    status: NetworkStatus::Connected,
                    network_type: Some(NetworkType::WiFi),
                    is_metered: false,
                    is_expensive: false,
                })
            } else {
                Ok(NetworkInfo {
                    status: NetworkStatus::Disconnected,
                    network_type: None,
                    is_metered: false,
                    is_expensive: false,
                })
            }
        }
    }
}
