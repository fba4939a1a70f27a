//! Durable work queue with named lanes.
//!
//! The queue contract is at-least-once: a dequeued job lands in a per-lane
//! processing list where it stays invisible to other consumers until it is
//! acked, nacked, or its claim expires (visibility timeout). Consumers must
//! therefore keep task effects idempotent; article writes are keyed by
//! source URL for exactly this reason.
//!
//! Two implementations exist: [`RedisQueue`] (production) and
//! [`InMemoryQueue`](super::memory::InMemoryQueue) (development and tests).
//!
//! # Redis layout
//!
//! ```text
//! {ns}:{lane}             pending list (LPUSH head, BRPOPLPUSH tail)
//! {ns}:{lane}:processing  in-flight list
//! {ns}:{lane}:delayed     sorted set scored by not-before epoch millis
//! {ns}:{lane}:dead        abandoned jobs with error context
//! {ns}:claim:{job_id}     claim marker, TTL = visibility timeout
//! {ns}:status:{job_id}    JSON status record, TTL on terminal states
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TaskError;

use super::job::{Job, JobResult, JobStatus, Lane};

/// Default claim lifetime for a dequeued job.
const DEFAULT_VISIBILITY_SECS: u64 = 900;

/// Default TTL for terminal status records (7 days).
const DEFAULT_RESULT_TTL_SECS: u64 = 604_800;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to the queue backend.
    #[error("Queue connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Job serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A status write would violate the monotonic transition matrix.
    #[error("Illegal status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        /// The job whose record was being updated.
        job_id: Uuid,
        /// Status currently on record.
        from: JobStatus,
        /// Status the caller attempted to write.
        to: JobStatus,
    },
}

/// Whether a status record may move from `from` to `to`.
///
/// Nack and abandonment collapse the intermediate `Failed` step into a
/// single write, so `Running -> Pending` and `Running -> Abandoned` are
/// accepted when each leg of the chain is legal.
pub(crate) fn is_legal_transition(from: JobStatus, to: JobStatus) -> bool {
    if from.can_transition(to) {
        return true;
    }
    from.can_transition(JobStatus::Failed) && JobStatus::Failed.can_transition(to)
}

/// Durable status record maintained by the queue for every job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    /// Job identifier.
    pub job_id: Uuid,
    /// Lane the job belongs to.
    pub lane: Lane,
    /// Task kind label (e.g. "ingest_news").
    pub task: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Attempts recorded so far.
    pub attempts: u32,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
    /// Earliest delivery time, if the job is delayed.
    pub not_before: Option<DateTime<Utc>>,
    /// Terminal result, present once the job succeeded or was abandoned.
    pub result: Option<JobResult>,
}

impl JobStatusReport {
    /// Builds a record snapshot for `job` at `status`.
    pub fn from_job(job: &Job, status: JobStatus) -> Self {
        Self {
            job_id: job.id,
            lane: job.lane,
            task: job.payload.kind().to_string(),
            status,
            attempts: job.attempts,
            created_at: job.created_at,
            updated_at: Utc::now(),
            not_before: job.not_before,
            result: None,
        }
    }

    /// Attaches a terminal result.
    pub fn with_result(mut self, result: JobResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// Point-in-time counters for one lane.
#[derive(Debug, Clone)]
pub struct LaneStats {
    /// The lane these counters describe.
    pub lane: Lane,
    /// Jobs waiting for a worker.
    pub pending: usize,
    /// Jobs currently claimed by workers.
    pub processing: usize,
    /// Jobs scheduled for future delivery.
    pub delayed: usize,
    /// Jobs abandoned into the dead letter list.
    pub dead_letter: usize,
}

impl LaneStats {
    /// Jobs that still expect an execution (pending, in flight, delayed).
    pub fn backlog(&self) -> usize {
        self.pending + self.processing + self.delayed
    }
}

/// Lane-partitioned at-least-once work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Adds a job to its lane. Jobs with a future `not_before` are held
    /// back until due.
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Claims the next due job from a lane, blocking up to `timeout`.
    /// Returns `None` when the lane stays empty for the full window.
    async fn dequeue(&self, lane: Lane, timeout: Duration) -> Result<Option<Job>, QueueError>;

    /// Completes a claimed job, storing its terminal result.
    async fn ack(&self, job: &Job, result: JobResult) -> Result<(), QueueError>;

    /// Returns a claimed job to its lane for a later retry, delivering it
    /// no earlier than `delay` from now. The job's attempt count must
    /// already reflect the failed execution.
    async fn nack(&self, job: Job, delay: Duration) -> Result<(), QueueError>;

    /// Permanently removes a claimed job, recording the abandonment.
    async fn abandon(&self, job: &Job, result: JobResult) -> Result<(), QueueError>;

    /// Looks up the durable status record for a job.
    async fn job_status(&self, job_id: Uuid) -> Result<Option<JobStatusReport>, QueueError>;

    /// Point-in-time counters for a lane.
    async fn stats(&self, lane: Lane) -> Result<LaneStats, QueueError>;

    /// Requeues in-flight jobs whose claim has expired (worker crash or
    /// missed deadline). Returns the number of jobs moved. Jobs past
    /// their attempt budget are abandoned instead of requeued.
    async fn recover(&self, lane: Lane) -> Result<usize, QueueError>;
}

/// Redis-backed [`WorkQueue`].
#[derive(Clone)]
pub struct RedisQueue {
    redis: ConnectionManager,
    namespace: String,
    visibility_timeout: Duration,
    result_ttl: Duration,
}

impl RedisQueue {
    /// Connects to Redis and prepares a queue under `namespace`.
    pub async fn connect(redis_url: &str, namespace: &str) -> Result<Self, QueueError> {
        let client = Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(format!("Invalid Redis URL: {e}")))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(format!("Connection failed: {e}")))?;
        Ok(Self::from_connection(redis, namespace))
    }

    /// Creates a queue over an existing connection manager.
    pub fn from_connection(redis: ConnectionManager, namespace: &str) -> Self {
        Self {
            redis,
            namespace: namespace.to_string(),
            visibility_timeout: Duration::from_secs(DEFAULT_VISIBILITY_SECS),
            result_ttl: Duration::from_secs(DEFAULT_RESULT_TTL_SECS),
        }
    }

    /// Sets the visibility timeout for claimed jobs.
    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    /// Sets the TTL for terminal status records.
    pub fn with_result_ttl(mut self, result_ttl: Duration) -> Self {
        self.result_ttl = result_ttl;
        self
    }

    fn lane_key(&self, lane: Lane) -> String {
        format!("{}:{}", self.namespace, lane)
    }

    fn processing_key(&self, lane: Lane) -> String {
        format!("{}:{}:processing", self.namespace, lane)
    }

    fn delayed_key(&self, lane: Lane) -> String {
        format!("{}:{}:delayed", self.namespace, lane)
    }

    fn dead_letter_key(&self, lane: Lane) -> String {
        format!("{}:{}:dead", self.namespace, lane)
    }

    fn claim_key(&self, job_id: Uuid) -> String {
        format!("{}:claim:{}", self.namespace, job_id)
    }

    fn status_key(&self, job_id: Uuid) -> String {
        format!("{}:status:{}", self.namespace, job_id)
    }

    /// Writes the status record for `job`, enforcing the transition
    /// matrix against whatever is already on record.
    async fn write_status(
        &self,
        job: &Job,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let key = self.status_key(job.id);

        let existing: Option<String> = conn.get(&key).await?;
        if let Some(raw) = existing {
            if let Ok(previous) = serde_json::from_str::<JobStatusReport>(&raw) {
                if previous.status != status && !is_legal_transition(previous.status, status) {
                    return Err(QueueError::InvalidTransition {
                        job_id: job.id,
                        from: previous.status,
                        to: status,
                    });
                }
            }
        }

        let mut report = JobStatusReport::from_job(job, status);
        if let Some(result) = result {
            report = report.with_result(result);
        }
        let encoded = serde_json::to_string(&report)?;

        if status.is_terminal() {
            conn.set_ex::<_, _, ()>(&key, encoded, self.result_ttl.as_secs())
                .await?;
        } else {
            conn.set::<_, _, ()>(&key, encoded).await?;
        }
        Ok(())
    }

    /// Moves due entries from the delayed set into the pending list.
    async fn promote_due(&self, lane: Lane) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let delayed_key = self.delayed_key(lane);
        let now_ms = Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&delayed_key)
            .arg("-inf")
            .arg(now_ms)
            .query_async(&mut conn)
            .await?;

        for member in due {
            // ZREM returning 1 means this consumer won the promotion race.
            let removed: i64 = redis::cmd("ZREM")
                .arg(&delayed_key)
                .arg(&member)
                .query_async(&mut conn)
                .await?;
            if removed == 1 {
                conn.lpush::<_, _, ()>(self.lane_key(lane), &member).await?;
            }
        }
        Ok(())
    }

    /// Removes a claimed job entry from the processing list.
    async fn remove_from_processing(&self, lane: Lane, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let processing_key = self.processing_key(lane);

        let entries: Vec<String> = conn.lrange(&processing_key, 0, -1).await?;
        for raw in entries {
            if let Ok(entry) = serde_json::from_str::<Job>(&raw) {
                if entry.id == job_id {
                    conn.lrem::<_, _, ()>(&processing_key, 1, &raw).await?;
                    return Ok(());
                }
            }
        }
        // Already removed (e.g. by the reclaimer); not an error.
        Ok(())
    }

    async fn release_claim(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(self.claim_key(job_id)).await?;
        Ok(())
    }

    /// Appends an abandoned job to the lane's dead letter list.
    async fn push_dead_letter(&self, job: &Job, error: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let entry = serde_json::json!({
            "job": job,
            "error": error,
            "moved_at": Utc::now().to_rfc3339(),
        });
        conn.rpush::<_, _, ()>(self.dead_letter_key(job.lane), serde_json::to_string(&entry)?)
            .await?;
        Ok(())
    }

    /// Peeks at dead-lettered jobs without removing them.
    pub async fn peek_dead_letter(
        &self,
        lane: Lane,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, QueueError> {
        let mut conn = self.redis.clone();
        let data: Vec<String> = conn
            .lrange(self.dead_letter_key(lane), 0, limit as isize - 1)
            .await?;

        let entries: Result<Vec<serde_json::Value>, _> =
            data.iter().map(|s| serde_json::from_str(s)).collect();
        Ok(entries?)
    }

    /// Deletes every queue structure for a lane. Intended for tests and
    /// operator resets.
    pub async fn purge(&self, lane: Lane) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(self.lane_key(lane)).await?;
        conn.del::<_, ()>(self.processing_key(lane)).await?;
        conn.del::<_, ()>(self.delayed_key(lane)).await?;
        conn.del::<_, ()>(self.dead_letter_key(lane)).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let encoded = serde_json::to_string(&job)?;

        self.write_status(&job, JobStatus::Pending, None).await?;

        match job.not_before {
            Some(not_before) if not_before > Utc::now() => {
                redis::cmd("ZADD")
                    .arg(self.delayed_key(job.lane))
                    .arg(not_before.timestamp_millis())
                    .arg(&encoded)
                    .query_async::<_, ()>(&mut conn)
                    .await?;
                debug!(job_id = %job.id, lane = %job.lane, not_before = %not_before, "Job delayed");
            }
            _ => {
                conn.lpush::<_, _, ()>(self.lane_key(job.lane), &encoded)
                    .await?;
                debug!(job_id = %job.id, lane = %job.lane, task = job.payload.kind(), "Job enqueued");
            }
        }
        Ok(())
    }

    async fn dequeue(&self, lane: Lane, timeout: Duration) -> Result<Option<Job>, QueueError> {
        self.promote_due(lane).await?;

        let mut conn = self.redis.clone();
        let raw: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(self.lane_key(lane))
            .arg(self.processing_key(lane))
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let job: Job = serde_json::from_str(&raw)?;
        conn.set_ex::<_, _, ()>(
            self.claim_key(job.id),
            Utc::now().to_rfc3339(),
            self.visibility_timeout.as_secs(),
        )
        .await?;
        self.write_status(&job, JobStatus::Running, None).await?;

        debug!(job_id = %job.id, lane = %lane, "Job claimed");
        Ok(Some(job))
    }

    async fn ack(&self, job: &Job, result: JobResult) -> Result<(), QueueError> {
        self.write_status(job, JobStatus::Succeeded, Some(result))
            .await?;
        self.remove_from_processing(job.lane, job.id).await?;
        self.release_claim(job.id).await?;
        debug!(job_id = %job.id, "Job acked");
        Ok(())
    }

    async fn nack(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        self.remove_from_processing(job.lane, job.id).await?;
        self.release_claim(job.id).await?;

        let job = job.delayed_by(delay);
        self.write_status(&job, JobStatus::Pending, None).await?;

        let mut conn = self.redis.clone();
        let encoded = serde_json::to_string(&job)?;
        match job.not_before {
            Some(not_before) if not_before > Utc::now() => {
                redis::cmd("ZADD")
                    .arg(self.delayed_key(job.lane))
                    .arg(not_before.timestamp_millis())
                    .arg(&encoded)
                    .query_async::<_, ()>(&mut conn)
                    .await?;
            }
            _ => {
                conn.lpush::<_, _, ()>(self.lane_key(job.lane), &encoded)
                    .await?;
            }
        }
        debug!(job_id = %job.id, attempts = job.attempts, delay_secs = delay.as_secs(), "Job nacked");
        Ok(())
    }

    async fn abandon(&self, job: &Job, result: JobResult) -> Result<(), QueueError> {
        let error = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        self.write_status(job, JobStatus::Abandoned, Some(result))
            .await?;
        self.remove_from_processing(job.lane, job.id).await?;
        self.release_claim(job.id).await?;
        self.push_dead_letter(job, &error).await?;
        warn!(job_id = %job.id, attempts = job.attempts, error = %error, "Job abandoned");
        Ok(())
    }

    async fn job_status(&self, job_id: Uuid) -> Result<Option<JobStatusReport>, QueueError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(self.status_key(job_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn stats(&self, lane: Lane) -> Result<LaneStats, QueueError> {
        let mut conn1 = self.redis.clone();
        let mut conn2 = self.redis.clone();
        let mut conn3 = self.redis.clone();
        let mut conn4 = self.redis.clone();

        let (pending, processing, delayed, dead_letter): (usize, usize, usize, usize) = tokio::try_join!(
            conn1.llen(self.lane_key(lane)),
            conn2.llen(self.processing_key(lane)),
            conn3.zcard(self.delayed_key(lane)),
            conn4.llen(self.dead_letter_key(lane)),
        )?;

        Ok(LaneStats {
            lane,
            pending,
            processing,
            delayed,
            dead_letter,
        })
    }

    async fn recover(&self, lane: Lane) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let processing_key = self.processing_key(lane);
        let entries: Vec<String> = conn.lrange(&processing_key, 0, -1).await?;

        let mut moved = 0;
        for raw in entries {
            let Ok(mut job) = serde_json::from_str::<Job>(&raw) else {
                warn!(lane = %lane, "Dropping unparseable processing entry");
                conn.lrem::<_, _, ()>(&processing_key, 1, &raw).await?;
                continue;
            };

            let claimed: bool = conn.exists(self.claim_key(job.id)).await?;
            if claimed {
                continue;
            }

            let removed: i64 = conn.lrem(&processing_key, 1, &raw).await?;
            if removed == 0 {
                continue;
            }

            job.increment_attempts();
            if job.should_retry() {
                self.write_status(&job, JobStatus::Pending, None).await?;
                let encoded = serde_json::to_string(&job)?;
                conn.lpush::<_, _, ()>(self.lane_key(lane), encoded).await?;
                warn!(job_id = %job.id, attempts = job.attempts, "Reclaimed stale job");
            } else {
                let error = TaskError::Timeout(self.visibility_timeout);
                let result = JobResult::abandoned(&job, &error, "reclaimer", Duration::ZERO);
                self.write_status(&job, JobStatus::Abandoned, Some(result))
                    .await?;
                self.push_dead_letter(&job, "visibility timeout expired, attempt budget exhausted")
                    .await?;
                warn!(job_id = %job.id, "Stale job abandoned");
            }
            moved += 1;
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskPayload;

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));

        let err = QueueError::InvalidTransition {
            job_id: Uuid::new_v4(),
            from: JobStatus::Succeeded,
            to: JobStatus::Running,
        };
        assert!(err.to_string().contains("succeeded"));
        assert!(err.to_string().contains("running"));
    }

    #[test]
    fn test_legal_transitions_include_collapsed_failure() {
        assert!(is_legal_transition(JobStatus::Pending, JobStatus::Running));
        assert!(is_legal_transition(JobStatus::Running, JobStatus::Succeeded));
        // Nack and abandonment collapse Running -> Failed -> next.
        assert!(is_legal_transition(JobStatus::Running, JobStatus::Pending));
        assert!(is_legal_transition(JobStatus::Running, JobStatus::Abandoned));

        assert!(!is_legal_transition(JobStatus::Succeeded, JobStatus::Running));
        assert!(!is_legal_transition(JobStatus::Abandoned, JobStatus::Pending));
        assert!(!is_legal_transition(JobStatus::Pending, JobStatus::Succeeded));
    }

    #[test]
    fn test_status_report_snapshot() {
        let mut job = Job::new(TaskPayload::HealthCheck);
        job.increment_attempts();

        let report = JobStatusReport::from_job(&job, JobStatus::Running);
        assert_eq!(report.job_id, job.id);
        assert_eq!(report.lane, Lane::Maintenance);
        assert_eq!(report.task, "health_check");
        assert_eq!(report.status, JobStatus::Running);
        assert_eq!(report.attempts, 1);
        assert!(report.result.is_none());
    }

    #[test]
    fn test_lane_stats_backlog() {
        let stats = LaneStats {
            lane: Lane::Ingestion,
            pending: 10,
            processing: 2,
            delayed: 3,
            dead_letter: 5,
        };
        assert_eq!(stats.backlog(), 15);
    }

    #[test]
    fn test_status_report_roundtrip() {
        let job = Job::new(TaskPayload::IngestNews { limit: 5 });
        let report = JobStatusReport::from_job(&job, JobStatus::Pending);

        let encoded = serde_json::to_string(&report).expect("report should serialize");
        let decoded: JobStatusReport =
            serde_json::from_str(&encoded).expect("report should deserialize");
        assert_eq!(decoded.job_id, report.job_id);
        assert_eq!(decoded.status, JobStatus::Pending);
        assert_eq!(decoded.task, "ingest_news");
    }

    #[test]
    fn test_dead_letter_entry_shape() {
        let job = Job::new(TaskPayload::IngestNews { limit: 5 });
        let entry = serde_json::json!({
            "job": job,
            "error": "translator unavailable",
            "moved_at": Utc::now().to_rfc3339(),
        });

        let encoded = serde_json::to_string(&entry).expect("entry should serialize");
        let parsed: serde_json::Value = serde_json::from_str(&encoded).expect("should parse back");
        assert!(parsed.get("job").is_some());
        assert!(parsed.get("error").is_some());
        assert!(parsed.get("moved_at").is_some());
    }
}
