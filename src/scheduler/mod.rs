//! Background processing engine: scheduling, queueing and workers.
//!
//! This module provides the infrastructure that turns recurring and
//! on-demand work into durable jobs:
//!
//! - **Beat**: evaluates registered schedules and enqueues due jobs
//! - **WorkQueue**: lane-partitioned at-least-once queue (Redis or in-memory)
//! - **WorkerPool**: per-lane workers with timeouts, retries and claim recovery
//! - **RetryPolicy**: exponential backoff with jitter and an attempt budget
//!
//! # Architecture
//!
//! ```text
//!    ┌──────────┐  tick   ┌───────────────────────────┐
//!    │   Beat   ├────────►│         WorkQueue         │
//!    └──────────┘ enqueue │  ingestion │ maintenance  │
//!    ┌──────────┐         └──────┬───────────┬────────┘
//!    │  Manual  ├────────────────┘           │
//!    │ trigger  │ enqueue      dequeue/ack/nack
//!    └──────────┘                            │
//!                  ┌─────────────┬───────────┴──┐
//!                  ▼             ▼              ▼
//!             ┌─────────┐   ┌─────────┐   ┌──────────┐
//!             │ingest-0 │   │ingest-1 │   │maintain-0│
//!             └─────────┘   └─────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use linguanews::scheduler::{
//!     Beat, Job, RedisQueue, ScheduleSpec, TaskPayload, Trigger,
//!     WorkerPool, WorkerPoolConfig, WorkQueue,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let queue: Arc<dyn WorkQueue> =
//!     Arc::new(RedisQueue::connect("redis://localhost:6379", "linguanews").await?);
//!
//! // One-off manual trigger
//! queue.enqueue(Job::new(TaskPayload::IngestNews { limit: 10 })).await?;
//!
//! // Recurring schedule
//! let mut beat = Beat::new(queue.clone());
//! beat.register(ScheduleSpec::new(
//!     "ingest-news",
//!     TaskPayload::IngestNews { limit: 10 },
//!     Trigger::Every(Duration::from_secs(300)),
//! ));
//!
//! let mut pool = WorkerPool::new(WorkerPoolConfig::default(), queue, runner);
//! pool.start().await?;
//! ```
//!
//! # Reliability
//!
//! - **Atomic dequeue**: BRPOPLPUSH moves jobs into a processing list in one step
//! - **Claim recovery**: jobs whose claim expired are requeued with their attempt
//!   count intact, giving at-least-once delivery
//! - **Dead letter list**: abandoned jobs are preserved for inspection
//! - **Graceful shutdown**: workers finish their current job before stopping

pub mod beat;
pub mod job;
pub mod memory;
pub mod queue;
pub mod retry;
pub mod worker_pool;

// Re-export main types for convenience
pub use beat::{Beat, ScheduleSpec, Trigger};
pub use job::{Job, JobOutcome, JobResult, JobStatus, Lane, TaskPayload, DEFAULT_MAX_ATTEMPTS};
pub use memory::InMemoryQueue;
pub use queue::{JobStatusReport, LaneStats, QueueError, RedisQueue, WorkQueue};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker_pool::{JobExecutor, PoolError, PoolStats, WorkerPool, WorkerPoolConfig};
