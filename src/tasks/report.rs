//! Task execution reports.
//!
//! Every task variant produces a typed report that rides on the job's
//! terminal result. Reports are serialized into the status store, so
//! they survive restarts and can be inspected after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// One failed item inside an otherwise-successful batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Source URL of the item that failed.
    pub url: String,
    /// Stable error kind label (see [`TaskError::kind`]).
    pub kind: String,
    /// Human-readable failure detail.
    pub message: String,
    /// Whether a retry could plausibly succeed.
    pub retryable: bool,
}

/// Report from a batch or single-article ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    /// Items pulled from the feed.
    pub fetched: usize,
    /// Items translated, embedded, and stored this run.
    pub processed: usize,
    /// Items skipped because their URL was already stored.
    pub skipped: usize,
    /// Items that failed. The batch still counts as succeeded when
    /// anything else made progress.
    pub failures: Vec<ItemFailure>,
}

impl IngestionReport {
    /// Creates an empty report for a batch of `fetched` items.
    pub fn new(fetched: usize) -> Self {
        Self {
            fetched,
            processed: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    /// Counts one stored article.
    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    /// Counts one already-stored article.
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Records a failed item with its error classification.
    pub fn record_failure(&mut self, url: impl Into<String>, error: &TaskError) {
        self.failures.push(ItemFailure {
            url: url.into(),
            kind: error.kind().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        });
    }

    /// Number of failed items.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether the run succeeded with some items failing.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Health of one probed component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentHealth {
    /// The component answered its probe.
    Healthy,
    /// The probe failed or returned something unusable.
    Degraded,
}

/// Probe result for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Component name ("store", "embedder", "queue").
    pub component: String,
    /// Probe verdict.
    pub health: ComponentHealth,
    /// Failure detail, present when degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Report from a health check run.
///
/// A degraded component never fails the job; it is recorded here and
/// surfaces as a partial success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Per-component probe results.
    pub components: Vec<ComponentStatus>,
    /// When the probes ran.
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Creates an empty report stamped with the current time.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    /// Records a healthy component.
    pub fn healthy(&mut self, component: impl Into<String>) {
        self.components.push(ComponentStatus {
            component: component.into(),
            health: ComponentHealth::Healthy,
            detail: None,
        });
    }

    /// Records a degraded component with its failure detail.
    pub fn degraded(&mut self, component: impl Into<String>, detail: impl ToString) {
        self.components.push(ComponentStatus {
            component: component.into(),
            health: ComponentHealth::Degraded,
            detail: Some(detail.to_string()),
        });
    }

    /// Whether every probed component is healthy.
    pub fn is_healthy(&self) -> bool {
        self.components
            .iter()
            .all(|c| c.health == ComponentHealth::Healthy)
    }

    /// Looks up one component's status by name.
    pub fn component(&self, name: &str) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.component == name)
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Report from a retention cleanup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Articles removed.
    pub deleted: u64,
    /// Records fetched before this time were removed.
    pub cutoff: DateTime<Utc>,
}

/// Typed report of a completed task, one variant per task family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum TaskReport {
    /// Batch or single-article ingestion.
    Ingestion(IngestionReport),
    /// Component health probes.
    Health(HealthReport),
    /// Retention cleanup.
    Cleanup(CleanupReport),
}

impl TaskReport {
    /// Whether the task succeeded with caveats worth surfacing: item
    /// failures in a batch, or a degraded component.
    pub fn is_partial(&self) -> bool {
        match self {
            TaskReport::Ingestion(report) => report.is_partial(),
            TaskReport::Health(report) => !report.is_healthy(),
            TaskReport::Cleanup(_) => false,
        }
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        match self {
            TaskReport::Ingestion(r) => format!(
                "fetched {} processed {} skipped {} failed {}",
                r.fetched,
                r.processed,
                r.skipped,
                r.failed()
            ),
            TaskReport::Health(r) => {
                let degraded: Vec<&str> = r
                    .components
                    .iter()
                    .filter(|c| c.health == ComponentHealth::Degraded)
                    .map(|c| c.component.as_str())
                    .collect();
                if degraded.is_empty() {
                    format!("{} components healthy", r.components.len())
                } else {
                    format!("degraded: {}", degraded.join(", "))
                }
            }
            TaskReport::Cleanup(r) => format!("deleted {} articles", r.deleted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ingestion_report_counters() {
        let mut report = IngestionReport::new(5);
        report.record_processed();
        report.record_processed();
        report.record_skip();
        report.record_failure(
            "https://news.example.org/a",
            &TaskError::unavailable("translator", "503"),
        );

        assert_eq!(report.fetched, 5);
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed(), 1);
        assert!(report.is_partial());
    }

    #[test]
    fn test_clean_report_is_not_partial() {
        let mut report = IngestionReport::new(3);
        report.record_processed();
        report.record_skip();
        assert!(!report.is_partial());
    }

    #[test]
    fn test_failure_captures_error_classification() {
        let mut report = IngestionReport::new(2);
        report.record_failure(
            "https://news.example.org/bad",
            &TaskError::InvalidInput("empty body".to_string()),
        );
        report.record_failure(
            "https://news.example.org/slow",
            &TaskError::Timeout(Duration::from_secs(30)),
        );

        assert_eq!(report.failures[0].kind, "invalid_input");
        assert!(!report.failures[0].retryable);
        assert_eq!(report.failures[1].kind, "timeout");
        assert!(report.failures[1].retryable);
    }

    #[test]
    fn test_health_report_aggregation() {
        let mut report = HealthReport::new();
        report.healthy("store");
        report.healthy("embedder");
        assert!(report.is_healthy());

        report.degraded("queue", "connection refused");
        assert!(!report.is_healthy());

        let queue = report.component("queue").expect("queue status");
        assert_eq!(queue.health, ComponentHealth::Degraded);
        assert_eq!(queue.detail.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_task_report_partiality() {
        let mut partial = IngestionReport::new(2);
        partial.record_processed();
        partial.record_failure(
            "https://news.example.org/a",
            &TaskError::unavailable("embedder", "503"),
        );
        assert!(TaskReport::Ingestion(partial).is_partial());

        let mut degraded = HealthReport::new();
        degraded.degraded("store", "down");
        assert!(TaskReport::Health(degraded).is_partial());

        assert!(!TaskReport::Cleanup(CleanupReport {
            deleted: 12,
            cutoff: Utc::now(),
        })
        .is_partial());
    }

    #[test]
    fn test_report_serialization_tags_variants() {
        let report = TaskReport::Cleanup(CleanupReport {
            deleted: 3,
            cutoff: Utc::now(),
        });
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["report"], "cleanup");
        assert_eq!(value["deleted"], 3);

        let decoded: TaskReport = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn test_summaries() {
        let mut ingestion = IngestionReport::new(4);
        ingestion.record_processed();
        assert_eq!(
            TaskReport::Ingestion(ingestion).summary(),
            "fetched 4 processed 1 skipped 0 failed 0"
        );

        let mut health = HealthReport::new();
        health.healthy("store");
        health.degraded("queue", "timeout");
        assert_eq!(TaskReport::Health(health).summary(), "degraded: queue");
    }
}
