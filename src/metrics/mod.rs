//! Prometheus-based operational metrics.
//!
//! Job settlement, queue depth, LLM usage, ingestion volume, and chat
//! latency are all recorded here. Recording is a no-op until
//! [`init_metrics`] runs, so library consumers who never initialize
//! metrics pay nothing.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use linguanews::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! // Initialize metrics on startup
//! init_metrics().expect("Failed to initialize metrics");
//!
//! // Record a settled job
//! MetricsCollector::record_job("ingestion", "ingest_news", "succeeded", Duration::from_secs(42));
//!
//! // Export metrics for scraping
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

// Re-export key types for convenient access
pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

// Re-export metric constants for direct access when needed
pub use prometheus::{
    ARTICLES_INGESTED, CHATS_TOTAL, CHAT_DURATION, JOBS_TOTAL, JOB_DURATION, LLM_LATENCY,
    LLM_REQUESTS_TOTAL, LLM_TOKENS_TOTAL, QUEUE_DEPTH, REGISTRY,
};
