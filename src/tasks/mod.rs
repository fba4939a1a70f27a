//! Task implementations executed by the worker pool.
//!
//! Each [`TaskPayload`](crate::scheduler::TaskPayload) variant maps to a
//! task here via [`TaskRunner`]:
//!
//! ```text
//!   IngestNews / IngestArticle ──► IngestionTask   fetch → translate → embed → store
//!   HealthCheck                ──► MaintenanceTask probe store, embedder, queue
//!   Cleanup                    ──► MaintenanceTask drop articles past retention
//! ```
//!
//! Tasks fail with [`TaskError`](crate::error::TaskError) and report
//! progress through [`TaskReport`]; the worker pool turns the two into
//! retries, abandonments, and partial successes.

pub mod ingestion;
pub mod maintenance;
pub mod report;
pub mod runner;

pub use ingestion::IngestionTask;
pub use maintenance::MaintenanceTask;
pub use report::{
    CleanupReport, ComponentHealth, ComponentStatus, HealthReport, IngestionReport, ItemFailure,
    TaskReport,
};
pub use runner::TaskRunner;
