//! Job definitions for the scheduling subsystem.
//!
//! This module defines the core types that flow through the work queue:
//!
//! - `Lane`: named queue partitions isolating job families
//! - `TaskPayload`: the closed set of schedulable task variants
//! - `Job`: a unit of work with its retry/attempt state
//! - `JobStatus`: lifecycle status with a monotonic transition matrix
//! - `JobResult`: terminal result stored alongside the status record

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;
use crate::tasks::TaskReport;

/// Default maximum number of execution attempts for a job.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Named partition of the work queue.
///
/// Lanes isolate job families so a slow ingestion backlog cannot starve
/// maintenance jobs. Each lane gets its own Redis keys and its own set of
/// workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// News fetching, translation, and embedding jobs.
    Ingestion,
    /// Health checks and retention cleanup.
    Maintenance,
}

impl Lane {
    /// All lanes, in a stable order. Used when iterating queue state.
    pub const ALL: [Lane; 2] = [Lane::Ingestion, Lane::Maintenance];

    /// Stable string form used in queue keys, logs, and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Ingestion => "ingestion",
            Lane::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Lane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingestion" => Ok(Lane::Ingestion),
            "maintenance" => Ok(Lane::Maintenance),
            other => Err(format!("unknown lane: {other}")),
        }
    }
}

/// The closed set of task variants the worker pool can execute.
///
/// Dispatch happens by matching on this enum, never by string lookup, so
/// adding a task variant is a compile-time visible change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Fetch up to `limit` articles from the news feed and process each
    /// new one (translate, embed, store).
    IngestNews {
        /// Maximum number of feed items to fetch.
        limit: usize,
    },
    /// Process a single article by URL. Used for item-level retries when
    /// one item of a batch ingestion failed.
    IngestArticle {
        /// Source URL of the article to process.
        url: String,
    },
    /// Probe store, embedder, and queue reachability. Never mutates data.
    HealthCheck,
    /// Delete articles older than the retention window.
    Cleanup {
        /// Retention window in days; records older than this are removed.
        retention_days: u32,
    },
}

impl TaskPayload {
    /// The lane this payload is routed to.
    pub fn lane(&self) -> Lane {
        match self {
            TaskPayload::IngestNews { .. } | TaskPayload::IngestArticle { .. } => Lane::Ingestion,
            TaskPayload::HealthCheck | TaskPayload::Cleanup { .. } => Lane::Maintenance,
        }
    }

    /// Stable task name for logs, metrics labels, and status records.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::IngestNews { .. } => "ingest_news",
            TaskPayload::IngestArticle { .. } => "ingest_article",
            TaskPayload::HealthCheck => "health_check",
            TaskPayload::Cleanup { .. } => "cleanup",
        }
    }

    /// Validates payload parameters before the job is accepted.
    ///
    /// Called by the manual-trigger surface so malformed requests are
    /// rejected up front instead of burning a worker attempt.
    pub fn validate(&self) -> Result<(), TaskError> {
        match self {
            TaskPayload::IngestNews { limit } => {
                if *limit == 0 {
                    return Err(TaskError::InvalidInput(
                        "fetch limit must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
            TaskPayload::IngestArticle { url } => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(TaskError::InvalidInput(format!(
                        "article url must be http(s): {url}"
                    )));
                }
                Ok(())
            }
            TaskPayload::HealthCheck => Ok(()),
            TaskPayload::Cleanup { retention_days } => {
                if *retention_days == 0 {
                    return Err(TaskError::InvalidInput(
                        "retention window must be at least 1 day".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// A unit of schedulable work.
///
/// Jobs are serialized as JSON into the queue, so every field here
/// survives worker restarts. In particular `attempts` rides on the job
/// record rather than in worker memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: Uuid,
    /// Queue lane the job is routed to (derived from the payload).
    pub lane: Lane,
    /// Task parameters.
    pub payload: TaskPayload,
    /// Number of execution attempts so far.
    pub attempts: u32,
    /// Attempt budget before the job is abandoned.
    pub max_attempts: u32,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may be delivered to a worker. `None` means
    /// immediately deliverable.
    pub not_before: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a job for the given payload with default retry budget.
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            lane: payload.lane(),
            payload,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: Utc::now(),
            not_before: None,
        }
    }

    /// Sets the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delays delivery until `delay` from now has elapsed.
    pub fn delayed_by(mut self, delay: Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        self.not_before = Some(Utc::now() + delay);
        self
    }

    /// Sets an explicit earliest delivery time.
    pub fn with_not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }

    /// Whether the job may be delivered at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|t| now >= t)
    }

    /// Records the start of another execution attempt.
    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }

    /// Whether the job still has attempt budget left.
    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Attempts remaining before abandonment.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Time elapsed since the job was created.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// Lifecycle status of a job.
///
/// Transitions are monotonic: `Pending → Running → {Succeeded | Failed}`,
/// `Failed → Pending` on retry, `Failed → Abandoned` once the attempt
/// budget is exhausted or the error is not retryable. `Succeeded` and
/// `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue (or delayed) for a worker.
    Pending,
    /// Claimed by a worker and executing.
    Running,
    /// Completed successfully (possibly with per-item failures, see
    /// [`JobOutcome::PartialSuccess`]).
    Succeeded,
    /// Last attempt failed; the job is about to be retried or abandoned.
    Failed,
    /// Attempt budget exhausted or error not retryable. Terminal.
    Abandoned,
}

impl JobStatus {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Failed, Pending)
                | (Failed, Abandoned)
        )
    }

    /// Whether this status ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Abandoned)
    }

    /// Stable string form for logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome refinement stored with a terminal job result.
///
/// `PartialSuccess` marks a succeeded ingestion job where some items
/// failed; it is a warning, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every step of the task completed.
    Succeeded,
    /// The job succeeded but some items within it failed.
    PartialSuccess,
    /// The job was abandoned after exhausting retries or failing with a
    /// non-retryable error.
    Abandoned,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::PartialSuccess => "partial_success",
            JobOutcome::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

/// Terminal result of a job execution, stored by the queue with the
/// status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// ID of the job this result belongs to.
    pub job_id: Uuid,
    /// Terminal status (`Succeeded` or `Abandoned`).
    pub status: JobStatus,
    /// Outcome refinement (partial success is visible here).
    pub outcome: JobOutcome,
    /// Task-specific report, present on success.
    pub report: Option<TaskReport>,
    /// Error message, present on abandonment.
    pub error: Option<String>,
    /// Error kind label, present on abandonment.
    pub error_kind: Option<String>,
    /// Attempts consumed by the job.
    pub attempts: u32,
    /// Worker that produced this result.
    pub worker_id: String,
    /// Wall-clock duration of the final attempt in milliseconds.
    pub duration_ms: u64,
    /// When the result was produced.
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    /// Builds a success result; the outcome downgrades to
    /// `PartialSuccess` when the report contains item failures.
    pub fn succeeded(job: &Job, report: TaskReport, worker_id: &str, duration: Duration) -> Self {
        let outcome = if report.is_partial() {
            JobOutcome::PartialSuccess
        } else {
            JobOutcome::Succeeded
        };
        Self {
            job_id: job.id,
            status: JobStatus::Succeeded,
            outcome,
            report: Some(report),
            error: None,
            error_kind: None,
            attempts: job.attempts,
            worker_id: worker_id.to_string(),
            duration_ms: duration.as_millis() as u64,
            completed_at: Utc::now(),
        }
    }

    /// Builds an abandonment result carrying the final error.
    pub fn abandoned(job: &Job, error: &TaskError, worker_id: &str, duration: Duration) -> Self {
        Self {
            job_id: job.id,
            status: JobStatus::Abandoned,
            outcome: JobOutcome::Abandoned,
            report: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            attempts: job.attempts,
            worker_id: worker_id.to_string(),
            duration_ms: duration.as_millis() as u64,
            completed_at: Utc::now(),
        }
    }

    /// Whether this result records a partial success.
    pub fn is_partial(&self) -> bool {
        self.outcome == JobOutcome::PartialSuccess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::IngestionReport;

    fn ingest_job() -> Job {
        Job::new(TaskPayload::IngestNews { limit: 5 })
    }

    #[test]
    fn test_lane_roundtrip() {
        for lane in Lane::ALL {
            let parsed: Lane = lane.as_str().parse().expect("lane should parse");
            assert_eq!(parsed, lane);
        }
        assert!("frontend".parse::<Lane>().is_err());
    }

    #[test]
    fn test_payload_lane_routing() {
        assert_eq!(TaskPayload::IngestNews { limit: 5 }.lane(), Lane::Ingestion);
        assert_eq!(
            TaskPayload::IngestArticle {
                url: "https://example.org/a".to_string()
            }
            .lane(),
            Lane::Ingestion
        );
        assert_eq!(TaskPayload::HealthCheck.lane(), Lane::Maintenance);
        assert_eq!(
            TaskPayload::Cleanup { retention_days: 30 }.lane(),
            Lane::Maintenance
        );
    }

    #[test]
    fn test_payload_validation() {
        assert!(TaskPayload::IngestNews { limit: 0 }.validate().is_err());
        assert!(TaskPayload::IngestNews { limit: 5 }.validate().is_ok());
        assert!(TaskPayload::IngestArticle {
            url: "ftp://example.org".to_string()
        }
        .validate()
        .is_err());
        assert!(TaskPayload::Cleanup { retention_days: 0 }.validate().is_err());
        assert!(TaskPayload::HealthCheck.validate().is_ok());
    }

    #[test]
    fn test_job_defaults() {
        let job = ingest_job();
        assert_eq!(job.lane, Lane::Ingestion);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(job.not_before.is_none());
        assert!(job.is_due(Utc::now()));
    }

    #[test]
    fn test_job_attempt_budget() {
        let mut job = ingest_job().with_max_attempts(2);
        assert!(job.should_retry());
        assert_eq!(job.remaining_attempts(), 2);

        job.increment_attempts();
        assert_eq!(job.attempts, 1);
        assert!(job.should_retry());

        job.increment_attempts();
        assert!(!job.should_retry());
        assert_eq!(job.remaining_attempts(), 0);
    }

    #[test]
    fn test_delayed_job_not_due() {
        let job = ingest_job().delayed_by(Duration::from_secs(60));
        let now = Utc::now();
        assert!(!job.is_due(now));
        assert!(job.is_due(now + chrono::Duration::seconds(120)));
    }

    #[test]
    fn test_status_transition_matrix() {
        use JobStatus::*;
        assert!(Pending.can_transition(Running));
        assert!(Running.can_transition(Succeeded));
        assert!(Running.can_transition(Failed));
        assert!(Failed.can_transition(Pending));
        assert!(Failed.can_transition(Abandoned));

        assert!(!Pending.can_transition(Succeeded));
        assert!(!Succeeded.can_transition(Running));
        assert!(!Abandoned.can_transition(Pending));
        assert!(!Running.can_transition(Abandoned));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Abandoned.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_serialization_roundtrip() {
        let job = ingest_job().delayed_by(Duration::from_secs(30));
        let encoded = serde_json::to_string(&job).expect("job should serialize");
        let decoded: Job = serde_json::from_str(&encoded).expect("job should deserialize");

        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.lane, job.lane);
        assert_eq!(decoded.payload, job.payload);
        assert_eq!(decoded.not_before, job.not_before);
    }

    #[test]
    fn test_result_partial_outcome() {
        let mut job = ingest_job();
        job.increment_attempts();

        let clean = IngestionReport::new(3);
        let result = JobResult::succeeded(&job, TaskReport::Ingestion(clean), "w-0", Duration::ZERO);
        assert_eq!(result.outcome, JobOutcome::Succeeded);
        assert!(!result.is_partial());

        let mut partial = IngestionReport::new(5);
        partial.processed = 4;
        partial.record_failure(
            "https://example.org/3",
            &TaskError::unavailable("translator", "503"),
        );
        let result =
            JobResult::succeeded(&job, TaskReport::Ingestion(partial), "w-0", Duration::ZERO);
        assert_eq!(result.outcome, JobOutcome::PartialSuccess);
        assert!(result.is_partial());
    }

    #[test]
    fn test_result_abandoned() {
        let mut job = ingest_job();
        job.increment_attempts();

        let err = TaskError::InvalidInput("bad payload".to_string());
        let result = JobResult::abandoned(&job, &err, "w-1", Duration::from_millis(12));
        assert_eq!(result.status, JobStatus::Abandoned);
        assert_eq!(result.outcome, JobOutcome::Abandoned);
        assert_eq!(result.error_kind.as_deref(), Some("invalid_input"));
        assert_eq!(result.attempts, 1);
    }
}
