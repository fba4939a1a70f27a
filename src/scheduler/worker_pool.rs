//! Worker pool for processing queued jobs.
//!
//! The pool spawns a fixed set of workers per lane. Each worker runs as an
//! independent async task, claims jobs from its lane, executes them through
//! a [`JobExecutor`] with a hard timeout, and settles the outcome with the
//! queue: ack on success, nack with a backoff delay when the retry policy
//! allows another attempt, abandon otherwise.
//!
//! A separate reclaimer task sweeps each lane for jobs whose claim expired
//! (worker crash or missed ack) and makes them deliverable again, which is
//! what gives the queue its at-least-once guarantee.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::TaskError;
use crate::metrics::MetricsCollector;
use crate::tasks::TaskReport;

use super::job::{Job, JobResult, Lane, TaskPayload};
use super::queue::WorkQueue;
use super::retry::{RetryDecision, RetryPolicy};

/// Executes one job payload to completion.
///
/// The pool only knows this seam; the concrete task logic lives in
/// [`crate::tasks::TaskRunner`].
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Runs the task described by `payload` and returns its report.
    async fn execute(&self, payload: &TaskPayload) -> Result<TaskReport, TaskError>;
}

/// Errors that can occur when controlling the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Workers dedicated to the ingestion lane.
    pub ingestion_workers: usize,
    /// Workers dedicated to the maintenance lane.
    pub maintenance_workers: usize,
    /// How long a dequeue blocks waiting for a job.
    pub poll_interval: Duration,
    /// Maximum time allowed for processing a single job.
    pub job_timeout: Duration,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
    /// How often the reclaimer sweeps for expired claims.
    pub reclaim_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            ingestion_workers: 2,
            maintenance_workers: 1,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            reclaim_interval: Duration::from_secs(450),
        }
    }
}

impl WorkerPoolConfig {
    /// Sets the ingestion lane worker count.
    pub fn with_ingestion_workers(mut self, n: usize) -> Self {
        self.ingestion_workers = n;
        self
    }

    /// Sets the maintenance lane worker count.
    pub fn with_maintenance_workers(mut self, n: usize) -> Self {
        self.maintenance_workers = n;
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the reclaimer sweep interval.
    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    /// Total worker tasks across both lanes.
    pub fn total_workers(&self) -> usize {
        self.ingestion_workers + self.maintenance_workers
    }
}

/// Point-in-time statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently executing a job.
    pub active_workers: usize,
    /// Executions that finished with a success result.
    pub jobs_succeeded: u64,
    /// Executions that finished with an error.
    pub jobs_failed: u64,
    /// Failed executions that were requeued for another attempt.
    pub jobs_retried: u64,
    /// Jobs abandoned permanently.
    pub jobs_abandoned: u64,
    /// Average execution duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Total executions observed (succeeded + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_succeeded + self.jobs_failed
    }

    /// Success rate as a percentage of executions.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_succeeded as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_abandoned: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            jobs_abandoned: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_success(&self, duration: Duration) {
        self.jobs_succeeded.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_retry(&self) {
        self.jobs_retried.fetch_add(1, Ordering::SeqCst);
    }

    fn record_abandon(&self) {
        self.jobs_abandoned.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let succeeded = self.jobs_succeeded.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total = succeeded + failed;
        let average_duration = if total > 0 {
            Duration::from_millis(total_duration_ms / total)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            jobs_succeeded: succeeded,
            jobs_failed: failed,
            jobs_retried: self.jobs_retried.load(Ordering::SeqCst),
            jobs_abandoned: self.jobs_abandoned.load(Ordering::SeqCst),
            average_job_duration: average_duration,
        }
    }
}

/// Pool of per-lane workers plus the claim reclaimer.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<dyn WorkQueue>,
    executor: Arc<dyn JobExecutor>,
    retry_policy: RetryPolicy,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
}

impl WorkerPool {
    /// Creates a worker pool over an existing queue and executor.
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<dyn WorkQueue>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        // Buffer size of 1 is sufficient since the shutdown signal is sent once
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            queue,
            executor,
            retry_policy: RetryPolicy::default(),
            shutdown_tx,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Replaces the retry policy consulted on job failure.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Starts all workers and the reclaimer.
    ///
    /// Expired claims left over from a previous run are recovered before
    /// any worker begins polling.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool is already running.
    pub async fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }

        for lane in Lane::ALL {
            match self.queue.recover(lane).await {
                Ok(recovered) if recovered > 0 => {
                    info!(lane = %lane, recovered = recovered, "Recovered jobs with expired claims");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(lane = %lane, error = %e, "Failed to recover expired claims");
                }
            }
        }

        let lanes = [
            (Lane::Ingestion, self.config.ingestion_workers),
            (Lane::Maintenance, self.config.maintenance_workers),
        ];
        for (lane, count) in lanes {
            for i in 0..count {
                let worker = Worker {
                    id: format!("{}-{}", lane.as_str(), i),
                    lane,
                    queue: Arc::clone(&self.queue),
                    executor: Arc::clone(&self.executor),
                    retry_policy: self.retry_policy.clone(),
                    shutdown_rx: self.shutdown_tx.subscribe(),
                    poll_interval: self.config.poll_interval,
                    job_timeout: self.config.job_timeout,
                    stats: Arc::clone(&self.stats),
                };
                self.worker_handles.push(tokio::spawn(worker.run()));
            }
        }

        self.worker_handles.push(tokio::spawn(reclaim_loop(
            Arc::clone(&self.queue),
            self.config.reclaim_interval,
            self.shutdown_tx.subscribe(),
        )));

        self.is_running.store(true, Ordering::SeqCst);
        info!(
            ingestion_workers = self.config.ingestion_workers,
            maintenance_workers = self.config.maintenance_workers,
            "Worker pool started"
        );

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// Sends a shutdown signal and waits for workers to finish their
    /// current jobs.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShutdownTimeout` if workers don't stop within
    /// the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!("Initiating worker pool shutdown");

        // Ignore send error - workers may have already stopped
        let _ = self.shutdown_tx.send(());

        let shutdown_future = async {
            for handle in self.worker_handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(self.config.shutdown_timeout, shutdown_future).await {
            Ok(()) => {
                self.is_running.store(false, Ordering::SeqCst);
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => {
                self.is_running.store(false, Ordering::SeqCst);
                Err(PoolError::ShutdownTimeout(self.config.shutdown_timeout))
            }
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.total_workers())
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Periodic sweep that recovers jobs whose claim expired and refreshes
/// the per-lane depth gauges.
async fn reclaim_loop(
    queue: Arc<dyn WorkQueue>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; startup recovery already ran in
    // `WorkerPool::start`, so consume it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("Reclaimer stopping");
                break;
            }
            _ = ticker.tick() => {
                for lane in Lane::ALL {
                    match queue.recover(lane).await {
                        Ok(0) => {}
                        Ok(n) => info!(lane = %lane, reclaimed = n, "Reclaimed jobs with expired claims"),
                        Err(e) => warn!(lane = %lane, error = %e, "Reclaim sweep failed"),
                    }
                    match queue.stats(lane).await {
                        Ok(stats) => MetricsCollector::record_queue_depth(lane.as_str(), stats.backlog()),
                        Err(e) => debug!(lane = %lane, error = %e, "Failed to read lane stats"),
                    }
                }
            }
        }
    }
}

/// A single worker bound to one lane.
struct Worker {
    id: String,
    lane: Lane,
    queue: Arc<dyn WorkQueue>,
    executor: Arc<dyn JobExecutor>,
    retry_policy: RetryPolicy,
    shutdown_rx: broadcast::Receiver<()>,
    poll_interval: Duration,
    job_timeout: Duration,
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    /// Main worker loop: polls the lane and processes jobs until a
    /// shutdown signal is received.
    async fn run(mut self) {
        info!(worker_id = %self.id, lane = %self.lane, "Worker started");

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    // Missed signals can only be shutdowns, check again
                    continue;
                }
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            match self.queue.dequeue(self.lane, self.poll_interval).await {
                Ok(Some(job)) => {
                    self.process_job(job).await;
                }
                Ok(None) => {
                    // Dequeue already waited the poll interval
                    debug!(worker_id = %self.id, "No jobs available");
                }
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue job");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Processes a single claimed job and settles it with the queue.
    async fn process_job(&self, mut job: Job) {
        let started = Instant::now();
        job.increment_attempts();

        info!(
            worker_id = %self.id,
            job_id = %job.id,
            task = job.payload.kind(),
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            "Processing job"
        );

        self.stats.increment_active();
        let outcome = self.execute_with_timeout(&job).await;
        let duration = started.elapsed();
        self.stats.decrement_active();

        match outcome {
            Ok(report) => self.settle_success(&job, report, duration).await,
            Err(error) => self.settle_failure(job, error, duration).await,
        }
    }

    async fn execute_with_timeout(&self, job: &Job) -> Result<TaskReport, TaskError> {
        match tokio::time::timeout(self.job_timeout, self.executor.execute(&job.payload)).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::Timeout(self.job_timeout)),
        }
    }

    async fn settle_success(&self, job: &Job, report: TaskReport, duration: Duration) {
        let result = JobResult::succeeded(job, report.clone(), &self.id, duration);
        let outcome = result.outcome;

        if let Err(e) = self.queue.ack(job, result).await {
            error!(worker_id = %self.id, job_id = %job.id, error = %e, "Failed to ack job");
        }
        self.stats.record_success(duration);
        MetricsCollector::record_job(
            self.lane.as_str(),
            job.payload.kind(),
            &outcome.to_string(),
            duration,
        );

        let item_retries = self.enqueue_item_retries(job, &report).await;

        info!(
            worker_id = %self.id,
            job_id = %job.id,
            outcome = %outcome,
            item_retries = item_retries,
            duration_ms = duration.as_millis() as u64,
            "Job finished"
        );
    }

    async fn settle_failure(&self, job: Job, error: TaskError, duration: Duration) {
        self.stats.record_failure(duration);

        match self.retry_policy.decide(job.attempts, &error) {
            RetryDecision::Retry { delay } => {
                self.stats.record_retry();
                MetricsCollector::record_job(
                    self.lane.as_str(),
                    job.payload.kind(),
                    "retried",
                    duration,
                );
                warn!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    error = %error,
                    attempt = job.attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "Job failed, scheduling retry"
                );
                if let Err(e) = self.queue.nack(job, delay).await {
                    error!(worker_id = %self.id, error = %e, "Failed to requeue job");
                }
            }
            RetryDecision::Abandon => {
                self.stats.record_abandon();
                MetricsCollector::record_job(
                    self.lane.as_str(),
                    job.payload.kind(),
                    "abandoned",
                    duration,
                );
                error!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    error = %error,
                    error_kind = error.kind(),
                    attempts = job.attempts,
                    "Job abandoned"
                );
                let result = JobResult::abandoned(&job, &error, &self.id, duration);
                if let Err(e) = self.queue.abandon(&job, result).await {
                    error!(worker_id = %self.id, job_id = %job.id, error = %e, "Failed to record abandonment");
                }
            }
        }
    }

    /// Schedules delayed single-article retry jobs for retryable item
    /// failures from a batch ingestion run. The batch job itself has
    /// already succeeded, so per-item recovery rides on fresh jobs.
    async fn enqueue_item_retries(&self, job: &Job, report: &TaskReport) -> usize {
        if !matches!(job.payload, TaskPayload::IngestNews { .. }) {
            return 0;
        }
        let TaskReport::Ingestion(report) = report else {
            return 0;
        };

        let delay = self.retry_policy.delay_for_attempt(1);
        let mut enqueued = 0;
        for failure in report.failures.iter().filter(|f| f.retryable) {
            let retry = Job::new(TaskPayload::IngestArticle {
                url: failure.url.clone(),
            })
            .with_max_attempts(job.max_attempts)
            .delayed_by(delay);

            match self.queue.enqueue(retry).await {
                Ok(()) => enqueued += 1,
                Err(e) => {
                    warn!(
                        worker_id = %self.id,
                        url = %failure.url,
                        error = %e,
                        "Failed to enqueue article retry"
                    );
                }
            }
        }

        if enqueued > 0 {
            info!(
                worker_id = %self.id,
                job_id = %job.id,
                retries = enqueued,
                "Enqueued per-article retry jobs"
            );
        }
        enqueued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::memory::InMemoryQueue;
    use crate::scheduler::{JobOutcome, JobStatus};
    use crate::tasks::IngestionReport;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    /// Executor whose outcomes are scripted per call, defaulting to a
    /// clean success once the script runs out.
    struct ScriptedExecutor {
        script: Mutex<VecDeque<Result<TaskReport, TaskError>>>,
        calls: AtomicU64,
    }

    impl ScriptedExecutor {
        fn new(script: Vec<Result<TaskReport, TaskError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU64::new(0),
            }
        }

        fn always_ok() -> Self {
            Self::new(Vec::new())
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobExecutor for ScriptedExecutor {
        async fn execute(&self, _payload: &TaskPayload) -> Result<TaskReport, TaskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(TaskReport::Ingestion(IngestionReport::new(0))))
        }
    }

    /// Executor that sleeps longer than any test job timeout.
    struct SlowExecutor;

    #[async_trait]
    impl JobExecutor for SlowExecutor {
        async fn execute(&self, _payload: &TaskPayload) -> Result<TaskReport, TaskError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(TaskReport::Ingestion(IngestionReport::new(0)))
        }
    }

    fn fast_config() -> WorkerPoolConfig {
        WorkerPoolConfig::default()
            .with_ingestion_workers(1)
            .with_maintenance_workers(1)
            .with_poll_interval(Duration::from_millis(20))
            .with_job_timeout(Duration::from_secs(5))
            .with_shutdown_timeout(Duration::from_secs(5))
            .with_reclaim_interval(Duration::from_secs(60))
    }

    /// Retries fire immediately and without jitter so tests stay fast.
    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(1))
            .with_jitter(0.0)
    }

    async fn wait_for_status(
        queue: &InMemoryQueue,
        job_id: Uuid,
        status: JobStatus,
    ) -> crate::scheduler::JobStatusReport {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(Some(report)) = queue.job_status(job_id).await {
                if report.status == status {
                    return report;
                }
            }
            assert!(
                Instant::now() < deadline,
                "job {job_id} never reached {status}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_successful_job_is_acked() {
        let queue = Arc::new(InMemoryQueue::new());
        let executor = Arc::new(ScriptedExecutor::always_ok());
        let mut pool = WorkerPool::new(fast_config(), queue.clone(), executor.clone());

        let job = Job::new(TaskPayload::IngestNews { limit: 3 });
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        pool.start().await.expect("start");
        let report = wait_for_status(&queue, job_id, JobStatus::Succeeded).await;
        pool.shutdown().await.expect("shutdown");

        assert_eq!(report.attempts, 1);
        assert_eq!(executor.calls(), 1);
        let stats = pool.stats();
        assert_eq!(stats.jobs_succeeded, 1);
        assert_eq!(stats.jobs_failed, 0);
    }

    #[tokio::test]
    async fn test_retryable_failure_exhausts_budget_then_abandons() {
        let queue = Arc::new(InMemoryQueue::new());
        // Every execution fails with a retryable error.
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Err(TaskError::unavailable("feed", "503")),
            Err(TaskError::unavailable("feed", "503")),
            Err(TaskError::unavailable("feed", "503")),
        ]));
        let mut pool = WorkerPool::new(fast_config(), queue.clone(), executor.clone())
            .with_retry_policy(fast_policy());

        let job = Job::new(TaskPayload::IngestNews { limit: 3 });
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        pool.start().await.expect("start");
        let report = wait_for_status(&queue, job_id, JobStatus::Abandoned).await;
        pool.shutdown().await.expect("shutdown");

        // Default budget of 3 attempts, all consumed.
        assert_eq!(report.attempts, 3);
        assert_eq!(executor.calls(), 3);
        let dead = queue.dead_letter(Lane::Ingestion).await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].0.id, job_id);
        assert_eq!(pool.stats().jobs_abandoned, 1);
        assert_eq!(pool.stats().jobs_retried, 2);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_on_retry() {
        let queue = Arc::new(InMemoryQueue::new());
        let executor = Arc::new(ScriptedExecutor::new(vec![Err(TaskError::unavailable(
            "feed", "503",
        ))]));
        let mut pool = WorkerPool::new(fast_config(), queue.clone(), executor.clone())
            .with_retry_policy(fast_policy());

        let job = Job::new(TaskPayload::IngestNews { limit: 3 });
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        pool.start().await.expect("start");
        let report = wait_for_status(&queue, job_id, JobStatus::Succeeded).await;
        pool.shutdown().await.expect("shutdown");

        assert_eq!(report.attempts, 2);
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_input_abandons_without_retry() {
        let queue = Arc::new(InMemoryQueue::new());
        let executor = Arc::new(ScriptedExecutor::new(vec![Err(TaskError::InvalidInput(
            "malformed feed url".to_string(),
        ))]));
        let mut pool = WorkerPool::new(fast_config(), queue.clone(), executor.clone())
            .with_retry_policy(fast_policy());

        let job = Job::new(TaskPayload::IngestNews { limit: 3 });
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        pool.start().await.expect("start");
        let report = wait_for_status(&queue, job_id, JobStatus::Abandoned).await;
        pool.shutdown().await.expect("shutdown");

        assert_eq!(report.attempts, 1);
        assert_eq!(executor.calls(), 1);
        let result = report.result.expect("abandonment result");
        assert_eq!(result.error_kind.as_deref(), Some("invalid_input"));
    }

    #[tokio::test]
    async fn test_job_timeout_counts_as_retryable_failure() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut pool = WorkerPool::new(
            fast_config().with_job_timeout(Duration::from_millis(50)),
            queue.clone(),
            Arc::new(SlowExecutor),
        )
        .with_retry_policy(fast_policy());

        let job = Job::new(TaskPayload::IngestNews { limit: 3 });
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        pool.start().await.expect("start");
        let report = wait_for_status(&queue, job_id, JobStatus::Abandoned).await;
        pool.shutdown().await.expect("shutdown");

        assert_eq!(report.attempts, 3);
        let result = report.result.expect("abandonment result");
        assert_eq!(result.error_kind.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_partial_success_spawns_article_retries() {
        let queue = Arc::new(InMemoryQueue::new());

        let mut report = IngestionReport::new(3);
        report.processed = 2;
        report.record_failure(
            "https://news.example.org/a",
            &TaskError::unavailable("translator", "503"),
        );
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskReport::Ingestion(
            report,
        ))]));

        // Long base delay keeps the follow-up parked in the delayed set.
        let mut pool = WorkerPool::new(fast_config(), queue.clone(), executor).with_retry_policy(
            RetryPolicy::default()
                .with_jitter(0.0)
                .with_base_delay(Duration::from_secs(60)),
        );

        let job = Job::new(TaskPayload::IngestNews { limit: 3 });
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        pool.start().await.expect("start");
        let parent = wait_for_status(&queue, job_id, JobStatus::Succeeded).await;
        pool.shutdown().await.expect("shutdown");

        let result = parent.result.expect("success result");
        assert_eq!(result.outcome, JobOutcome::PartialSuccess);

        // The follow-up rides the backoff delay, so it sits in the
        // delayed set rather than the pending list.
        let delayed = queue.delayed_jobs(Lane::Ingestion).await;
        assert_eq!(delayed.len(), 1);
        assert_eq!(
            delayed[0].payload,
            TaskPayload::IngestArticle {
                url: "https://news.example.org/a".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_retryable_item_failures_are_not_requeued() {
        let queue = Arc::new(InMemoryQueue::new());

        let mut report = IngestionReport::new(2);
        report.processed = 1;
        report.record_failure(
            "https://news.example.org/b",
            &TaskError::InvalidInput("empty body".to_string()),
        );
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(TaskReport::Ingestion(
            report,
        ))]));

        let mut pool = WorkerPool::new(fast_config(), queue.clone(), executor);

        let job = Job::new(TaskPayload::IngestNews { limit: 2 });
        let job_id = job.id;
        queue.enqueue(job).await.expect("enqueue");

        pool.start().await.expect("start");
        wait_for_status(&queue, job_id, JobStatus::Succeeded).await;
        pool.shutdown().await.expect("shutdown");

        assert!(queue.delayed_jobs(Lane::Ingestion).await.is_empty());
        assert!(queue.pending_jobs(Lane::Ingestion).await.is_empty());
    }

    #[tokio::test]
    async fn test_lanes_process_independently() {
        let queue = Arc::new(InMemoryQueue::new());
        let executor = Arc::new(ScriptedExecutor::always_ok());
        let mut pool = WorkerPool::new(fast_config(), queue.clone(), executor);

        let ingest = Job::new(TaskPayload::IngestNews { limit: 1 });
        let health = Job::new(TaskPayload::HealthCheck);
        let ingest_id = ingest.id;
        let health_id = health.id;
        queue.enqueue(ingest).await.expect("enqueue");
        queue.enqueue(health).await.expect("enqueue");

        pool.start().await.expect("start");
        wait_for_status(&queue, ingest_id, JobStatus::Succeeded).await;
        wait_for_status(&queue, health_id, JobStatus::Succeeded).await;
        pool.shutdown().await.expect("shutdown");

        assert_eq!(pool.stats().jobs_succeeded, 2);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut pool = WorkerPool::new(
            fast_config(),
            queue,
            Arc::new(ScriptedExecutor::always_ok()),
        );

        pool.start().await.expect("start");
        assert!(matches!(
            pool.start().await,
            Err(PoolError::AlreadyRunning)
        ));
        pool.shutdown().await.expect("shutdown");
        assert!(!pool.is_running());
    }

    #[test]
    fn test_pool_config_defaults() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.ingestion_workers, 2);
        assert_eq!(config.maintenance_workers, 1);
        assert_eq!(config.total_workers(), 3);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.job_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_pool_stats_calculations() {
        let stats = PoolStats {
            num_workers: 3,
            active_workers: 1,
            jobs_succeeded: 80,
            jobs_failed: 20,
            jobs_retried: 15,
            jobs_abandoned: 5,
            average_job_duration: Duration::from_secs(60),
        };

        assert_eq!(stats.total_processed(), 100);
        assert!((stats.success_rate() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shared_pool_stats_average() {
        let stats = SharedPoolStats::new();

        stats.record_success(Duration::from_secs(10));
        stats.record_success(Duration::from_secs(20));
        stats.record_failure(Duration::from_secs(5));

        let pool_stats = stats.to_pool_stats(3);
        assert_eq!(pool_stats.jobs_succeeded, 2);
        assert_eq!(pool_stats.jobs_failed, 1);
        // (10000 + 20000 + 5000) / 3
        assert!(pool_stats.average_job_duration.as_millis() > 11000);
        assert!(pool_stats.average_job_duration.as_millis() < 12000);
    }
}
