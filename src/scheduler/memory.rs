//! In-memory [`WorkQueue`] implementation.
//!
//! Mirrors the Redis queue contract (lanes, delayed delivery, claims with
//! a visibility timeout, dead letter, status records) over a single mutex.
//! Used when no Redis URL is configured and throughout the test suite.
//! Terminal status records are kept for the process lifetime instead of
//! expiring.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TaskError;

use super::job::{Job, JobResult, JobStatus, Lane};
use super::queue::{is_legal_transition, JobStatusReport, LaneStats, QueueError, WorkQueue};

const CLAIM_POLL: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct ClaimedJob {
    job: Job,
    claimed_at: Instant,
}

#[derive(Debug, Default)]
struct LaneState {
    pending: VecDeque<Job>,
    delayed: Vec<Job>,
    processing: HashMap<Uuid, ClaimedJob>,
    dead_letter: Vec<(Job, String)>,
}

#[derive(Debug, Default)]
struct QueueState {
    lanes: HashMap<Lane, LaneState>,
    statuses: HashMap<Uuid, JobStatusReport>,
}

impl QueueState {
    fn lane(&mut self, lane: Lane) -> &mut LaneState {
        self.lanes.entry(lane).or_default()
    }

    /// Writes a status record, enforcing the same transition matrix as
    /// the Redis implementation.
    fn write_status(
        &mut self,
        job: &Job,
        status: JobStatus,
        result: Option<JobResult>,
    ) -> Result<(), QueueError> {
        if let Some(previous) = self.statuses.get(&job.id) {
            if previous.status != status && !is_legal_transition(previous.status, status) {
                return Err(QueueError::InvalidTransition {
                    job_id: job.id,
                    from: previous.status,
                    to: status,
                });
            }
        }
        let mut report = JobStatusReport::from_job(job, status);
        if let Some(result) = result {
            report = report.with_result(result);
        }
        self.statuses.insert(job.id, report);
        Ok(())
    }

    /// Moves due delayed jobs into the pending queue.
    fn promote_due(&mut self, lane: Lane) {
        let now = Utc::now();
        let state = self.lane(lane);
        let mut still_delayed = Vec::new();
        for job in state.delayed.drain(..) {
            if job.is_due(now) {
                state.pending.push_back(job);
            } else {
                still_delayed.push(job);
            }
        }
        state.delayed = still_delayed;
    }
}

/// Mutex-guarded [`WorkQueue`] for development and tests.
#[derive(Debug)]
pub struct InMemoryQueue {
    visibility_timeout: Duration,
    state: Mutex<QueueState>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    /// Creates an empty queue with the default visibility timeout.
    pub fn new() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(900),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Sets the visibility timeout for claimed jobs.
    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    /// Snapshot of pending (immediately deliverable) jobs in a lane.
    pub async fn pending_jobs(&self, lane: Lane) -> Vec<Job> {
        let mut state = self.state.lock().await;
        state.promote_due(lane);
        state.lane(lane).pending.iter().cloned().collect()
    }

    /// Snapshot of delayed jobs in a lane.
    pub async fn delayed_jobs(&self, lane: Lane) -> Vec<Job> {
        let mut state = self.state.lock().await;
        state.lane(lane).delayed.to_vec()
    }

    /// Snapshot of the dead letter list for a lane.
    pub async fn dead_letter(&self, lane: Lane) -> Vec<(Job, String)> {
        let mut state = self.state.lock().await;
        state.lane(lane).dead_letter.to_vec()
    }

    async fn try_claim(&self, lane: Lane) -> Result<Option<Job>, QueueError> {
        let mut state = self.state.lock().await;
        state.promote_due(lane);

        let Some(job) = state.lane(lane).pending.pop_front() else {
            return Ok(None);
        };
        state.write_status(&job, JobStatus::Running, None)?;
        state.lane(lane).processing.insert(
            job.id,
            ClaimedJob {
                job: job.clone(),
                claimed_at: Instant::now(),
            },
        );
        debug!(job_id = %job.id, lane = %lane, "Job claimed");
        Ok(Some(job))
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.write_status(&job, JobStatus::Pending, None)?;
        let due = job.is_due(Utc::now());
        let lane = state.lane(job.lane);
        if due {
            lane.pending.push_back(job);
        } else {
            lane.delayed.push(job);
        }
        Ok(())
    }

    async fn dequeue(&self, lane: Lane, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(job) = self.try_claim(lane).await? {
                return Ok(Some(job));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(CLAIM_POLL.min(deadline - now)).await;
        }
    }

    async fn ack(&self, job: &Job, result: JobResult) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.write_status(job, JobStatus::Succeeded, Some(result))?;
        state.lane(job.lane).processing.remove(&job.id);
        debug!(job_id = %job.id, "Job acked");
        Ok(())
    }

    async fn nack(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.lane(job.lane).processing.remove(&job.id);

        let job = job.delayed_by(delay);
        state.write_status(&job, JobStatus::Pending, None)?;
        let due = job.is_due(Utc::now());
        let lane = state.lane(job.lane);
        if due {
            lane.pending.push_back(job);
        } else {
            lane.delayed.push(job);
        }
        Ok(())
    }

    async fn abandon(&self, job: &Job, result: JobResult) -> Result<(), QueueError> {
        let error = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        let mut state = self.state.lock().await;
        state.write_status(job, JobStatus::Abandoned, Some(result))?;
        state.lane(job.lane).processing.remove(&job.id);
        state
            .lane(job.lane)
            .dead_letter
            .push((job.clone(), error.clone()));
        warn!(job_id = %job.id, error = %error, "Job abandoned");
        Ok(())
    }

    async fn job_status(&self, job_id: Uuid) -> Result<Option<JobStatusReport>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.statuses.get(&job_id).cloned())
    }

    async fn stats(&self, lane: Lane) -> Result<LaneStats, QueueError> {
        let mut state = self.state.lock().await;
        let lane_state = state.lane(lane);
        Ok(LaneStats {
            lane,
            pending: lane_state.pending.len(),
            processing: lane_state.processing.len(),
            delayed: lane_state.delayed.len(),
            dead_letter: lane_state.dead_letter.len(),
        })
    }

    async fn recover(&self, lane: Lane) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;
        let visibility = self.visibility_timeout;

        let stale_ids: Vec<Uuid> = state
            .lane(lane)
            .processing
            .iter()
            .filter(|(_, claimed)| claimed.claimed_at.elapsed() >= visibility)
            .map(|(id, _)| *id)
            .collect();

        let mut moved = 0;
        for id in stale_ids {
            let Some(claimed) = state.lane(lane).processing.remove(&id) else {
                continue;
            };
            let mut job = claimed.job;
            job.increment_attempts();
            if job.should_retry() {
                state.write_status(&job, JobStatus::Pending, None)?;
                state.lane(lane).pending.push_back(job.clone());
                warn!(job_id = %job.id, attempts = job.attempts, "Reclaimed stale job");
            } else {
                let error = TaskError::Timeout(visibility);
                let result = JobResult::abandoned(&job, &error, "reclaimer", Duration::ZERO);
                state.write_status(&job, JobStatus::Abandoned, Some(result))?;
                state.lane(lane).dead_letter.push((
                    job.clone(),
                    "visibility timeout expired, attempt budget exhausted".to_string(),
                ));
                warn!(job_id = %job.id, "Stale job abandoned");
            }
            moved += 1;
        }
        Ok(moved)
    }
}
