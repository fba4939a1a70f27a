//! Periodic job scheduler.
//!
//! `Beat` owns an explicit registry of [`ScheduleSpec`]s and runs a single
//! cooperative timing loop. Each tick it evaluates which specs are due and
//! enqueues one job per due spec; it never executes task logic itself, so
//! scheduling stays decoupled from execution latency.
//!
//! A spec's firing state advances only when the enqueue succeeds. If the
//! queue is unavailable the spec simply stays due and is retried on the
//! next tick; duplicate suppression is the queue consumer's concern, not
//! the scheduler's.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::job::{Job, TaskPayload, DEFAULT_MAX_ATTEMPTS};
use super::queue::WorkQueue;

/// When a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    /// Fire when at least this long has passed since the last firing.
    /// Fires on the first tick after registration.
    Every(Duration),
    /// Fire once per day when the clock crosses this UTC time-of-day.
    DailyAt(NaiveTime),
}

/// A recurring trigger definition. Immutable after registration.
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    /// Human-readable schedule name for logs.
    pub name: String,
    /// Payload enqueued each time the schedule fires.
    pub payload: TaskPayload,
    /// Firing rule.
    pub trigger: Trigger,
}

impl ScheduleSpec {
    /// Creates a schedule spec.
    pub fn new(name: impl Into<String>, payload: TaskPayload, trigger: Trigger) -> Self {
        Self {
            name: name.into(),
            payload,
            trigger,
        }
    }
}

/// Registry entry with firing state.
#[derive(Debug)]
struct ScheduleEntry {
    spec: ScheduleSpec,
    last_fired: Option<DateTime<Utc>>,
    last_fired_date: Option<NaiveDate>,
}

impl ScheduleEntry {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.spec.trigger {
            Trigger::Every(interval) => match self.last_fired {
                None => true,
                Some(last) => {
                    let interval =
                        chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX);
                    now.signed_duration_since(last) >= interval
                }
            },
            Trigger::DailyAt(time) => {
                now.time() >= time && self.last_fired_date != Some(now.date_naive())
            }
        }
    }

    fn mark_fired(&mut self, now: DateTime<Utc>) {
        self.last_fired = Some(now);
        self.last_fired_date = Some(now.date_naive());
    }
}

/// The scheduling loop: evaluates registered specs and enqueues due jobs.
pub struct Beat {
    queue: Arc<dyn WorkQueue>,
    entries: Vec<ScheduleEntry>,
    max_attempts: u32,
    tick_interval: Duration,
}

impl Beat {
    /// Creates a scheduler over the given queue with an empty registry.
    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            queue,
            entries: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            tick_interval: Duration::from_secs(1),
        }
    }

    /// Sets the attempt budget stamped onto scheduled jobs.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the timing loop resolution.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Adds a recurring trigger to the registry.
    pub fn register(&mut self, spec: ScheduleSpec) {
        info!(schedule = %spec.name, trigger = ?spec.trigger, "Schedule registered");
        self.entries.push(ScheduleEntry {
            spec,
            last_fired: None,
            last_fired_date: None,
        });
    }

    /// Number of registered schedules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluates all specs at `now` and enqueues one job per due spec.
    /// Returns how many jobs were enqueued.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let mut enqueued = 0;
        for entry in &mut self.entries {
            if !entry.is_due(now) {
                continue;
            }

            let job = Job::new(entry.spec.payload.clone()).with_max_attempts(self.max_attempts);
            let job_id = job.id;
            match self.queue.enqueue(job).await {
                Ok(()) => {
                    entry.mark_fired(now);
                    enqueued += 1;
                    debug!(schedule = %entry.spec.name, job_id = %job_id, "Scheduled job enqueued");
                }
                Err(e) => {
                    // Firing state is not advanced, so the spec stays due
                    // and the enqueue is retried on the next tick.
                    error!(schedule = %entry.spec.name, error = %e, "Enqueue failed, retrying next tick");
                }
            }
        }
        enqueued
    }

    /// Drives [`tick`](Self::tick) until a shutdown signal arrives.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(schedules = self.entries.len(), "Beat loop started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Beat loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::memory::InMemoryQueue;
    use crate::scheduler::queue::QueueError;
    use crate::scheduler::{JobResult, JobStatusReport, Lane, LaneStats};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn ingest_spec(interval: Duration) -> ScheduleSpec {
        ScheduleSpec::new(
            "ingest-news",
            TaskPayload::IngestNews { limit: 5 },
            Trigger::Every(interval),
        )
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, s)
            .single()
            .expect("valid time")
    }

    #[tokio::test]
    async fn test_interval_fires_every_period() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut beat = Beat::new(queue.clone());
        beat.register(ingest_spec(Duration::from_secs(30)));

        let t0 = at(12, 0, 0);
        assert_eq!(beat.tick(t0).await, 1);
        assert_eq!(beat.tick(t0 + chrono::Duration::seconds(30)).await, 1);
        assert_eq!(beat.tick(t0 + chrono::Duration::seconds(60)).await, 1);

        let pending = queue.pending_jobs(Lane::Ingestion).await;
        assert_eq!(pending.len(), 3);
        assert!(pending
            .iter()
            .all(|j| j.payload == TaskPayload::IngestNews { limit: 5 }));
    }

    #[tokio::test]
    async fn test_interval_not_due_between_periods() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut beat = Beat::new(queue.clone());
        beat.register(ingest_spec(Duration::from_secs(30)));

        let t0 = at(12, 0, 0);
        assert_eq!(beat.tick(t0).await, 1);
        assert_eq!(beat.tick(t0 + chrono::Duration::seconds(10)).await, 0);
        assert_eq!(beat.tick(t0 + chrono::Duration::seconds(29)).await, 0);
        assert_eq!(queue.pending_jobs(Lane::Ingestion).await.len(), 1);
    }

    #[tokio::test]
    async fn test_daily_fires_once_per_day() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut beat = Beat::new(queue.clone());
        beat.register(ScheduleSpec::new(
            "cleanup",
            TaskPayload::Cleanup { retention_days: 30 },
            Trigger::DailyAt(NaiveTime::from_hms_opt(3, 0, 0).expect("valid time")),
        ));

        // Before the boundary: not due.
        assert_eq!(beat.tick(at(2, 59, 0)).await, 0);
        // Crossing the boundary fires once.
        assert_eq!(beat.tick(at(3, 0, 0)).await, 1);
        assert_eq!(beat.tick(at(3, 0, 30)).await, 0);
        assert_eq!(beat.tick(at(15, 0, 0)).await, 0);

        // Next day fires again.
        let next_day = at(3, 0, 0) + chrono::Duration::days(1);
        assert_eq!(beat.tick(next_day).await, 1);

        assert_eq!(queue.pending_jobs(Lane::Maintenance).await.len(), 2);
    }

    #[tokio::test]
    async fn test_daily_catches_up_after_late_start() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut beat = Beat::new(queue.clone());
        beat.register(ScheduleSpec::new(
            "cleanup",
            TaskPayload::Cleanup { retention_days: 30 },
            Trigger::DailyAt(NaiveTime::from_hms_opt(3, 0, 0).expect("valid time")),
        ));

        // First tick happens well past the boundary (late process start):
        // the schedule has not fired today, so it fires now.
        assert_eq!(beat.tick(at(10, 0, 0)).await, 1);
        assert_eq!(beat.tick(at(10, 0, 1)).await, 0);
    }

    /// Queue wrapper that fails enqueues while `failing` is set.
    struct FlakyQueue {
        inner: InMemoryQueue,
        failing: AtomicBool,
    }

    #[async_trait::async_trait]
    impl crate::scheduler::WorkQueue for FlakyQueue {
        async fn enqueue(&self, job: crate::scheduler::Job) -> Result<(), QueueError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(QueueError::ConnectionFailed("redis down".to_string()));
            }
            self.inner.enqueue(job).await
        }

        async fn dequeue(
            &self,
            lane: Lane,
            timeout: Duration,
        ) -> Result<Option<crate::scheduler::Job>, QueueError> {
            self.inner.dequeue(lane, timeout).await
        }

        async fn ack(
            &self,
            job: &crate::scheduler::Job,
            result: JobResult,
        ) -> Result<(), QueueError> {
            self.inner.ack(job, result).await
        }

        async fn nack(&self, job: crate::scheduler::Job, delay: Duration) -> Result<(), QueueError> {
            self.inner.nack(job, delay).await
        }

        async fn abandon(
            &self,
            job: &crate::scheduler::Job,
            result: JobResult,
        ) -> Result<(), QueueError> {
            self.inner.abandon(job, result).await
        }

        async fn job_status(&self, job_id: Uuid) -> Result<Option<JobStatusReport>, QueueError> {
            self.inner.job_status(job_id).await
        }

        async fn stats(&self, lane: Lane) -> Result<LaneStats, QueueError> {
            self.inner.stats(lane).await
        }

        async fn recover(&self, lane: Lane) -> Result<usize, QueueError> {
            self.inner.recover(lane).await
        }
    }

    #[tokio::test]
    async fn test_failed_enqueue_is_retried_next_tick() {
        let queue = Arc::new(FlakyQueue {
            inner: InMemoryQueue::new(),
            failing: AtomicBool::new(true),
        });
        let mut beat = Beat::new(queue.clone());
        beat.register(ingest_spec(Duration::from_secs(30)));

        let t0 = at(12, 0, 0);
        assert_eq!(beat.tick(t0).await, 0, "enqueue fails, nothing scheduled");

        // Queue comes back one tick later; the spec is still due because
        // its firing state never advanced.
        queue.failing.store(false, Ordering::SeqCst);
        assert_eq!(beat.tick(t0 + chrono::Duration::seconds(1)).await, 1);
        assert_eq!(queue.inner.pending_jobs(Lane::Ingestion).await.len(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_jobs_carry_attempt_budget() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut beat = Beat::new(queue.clone()).with_max_attempts(5);
        beat.register(ingest_spec(Duration::from_secs(30)));

        beat.tick(at(12, 0, 0)).await;
        let pending = queue.pending_jobs(Lane::Ingestion).await;
        assert_eq!(pending[0].max_attempts, 5);
    }
}
