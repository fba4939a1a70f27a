//! Prometheus metric registration and export.
//!
//! This module defines all Prometheus metrics used by linguanews and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all linguanews metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total jobs settled, labeled by lane, task kind, and outcome.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Job execution duration in seconds, labeled by lane.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Jobs waiting or delayed per lane.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Total LLM API requests, labeled by endpoint, model, and outcome.
pub static LLM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// LLM API request latency in seconds, labeled by endpoint.
pub static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Total tokens reported by providers, labeled by endpoint and type
/// (prompt/completion).
pub static LLM_TOKENS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total articles stored by ingestion runs.
pub static ARTICLES_INGESTED: OnceLock<Counter> = OnceLock::new();

/// Total chat turns answered, labeled by classified intent.
pub static CHATS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// End-to-end chat latency in seconds.
pub static CHAT_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Creates every metric with its labels and buckets
/// and registers it with the global registry. Safe to call again; later
/// calls leave the already-installed metrics in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically
/// due to duplicate metric names.
///
/// # Example
///
/// ```ignore
/// use linguanews::metrics::init_metrics;
///
/// fn main() {
///     init_metrics().expect("Failed to initialize metrics");
///     // Application continues...
/// }
/// ```
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Job metrics
    let jobs_total = CounterVec::new(
        Opts::new("linguanews_jobs_total", "Total jobs settled"),
        &["lane", "task", "outcome"],
    )?;

    let job_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "linguanews_job_duration_seconds",
            "Job execution duration in seconds",
        )
        // Ingestion jobs translate article by article, so runs stretch
        // into minutes.
        .buckets(vec![0.5, 2.0, 10.0, 30.0, 60.0, 180.0, 600.0]),
        &["lane"],
    )?;

    let queue_depth = GaugeVec::new(
        Opts::new("linguanews_queue_depth", "Jobs waiting or delayed per lane"),
        &["lane"],
    )?;

    // LLM metrics
    let llm_requests_total = CounterVec::new(
        Opts::new("linguanews_llm_requests_total", "Total LLM API requests"),
        &["endpoint", "model", "outcome"],
    )?;

    let llm_latency = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "linguanews_llm_latency_seconds",
            "LLM API request latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["endpoint"],
    )?;

    let llm_tokens_total = CounterVec::new(
        Opts::new("linguanews_llm_tokens_total", "Total tokens used"),
        &["endpoint", "type"],
    )?;

    // Ingestion and chat metrics
    let articles_ingested = Counter::new(
        "linguanews_articles_ingested_total",
        "Total articles stored by ingestion runs",
    )?;

    let chats_total = CounterVec::new(
        Opts::new("linguanews_chats_total", "Total chat turns answered"),
        &["intent"],
    )?;

    let chat_duration = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "linguanews_chat_duration_seconds",
            "End-to-end chat latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )?;

    // Register all metrics with the registry
    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(llm_requests_total.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;
    registry.register(Box::new(llm_tokens_total.clone()))?;
    registry.register(Box::new(articles_ingested.clone()))?;
    registry.register(Box::new(chats_total.clone()))?;
    registry.register(Box::new(chat_duration.clone()))?;

    // Store metrics in static variables
    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = LLM_REQUESTS_TOTAL.set(llm_requests_total);
    let _ = LLM_LATENCY.set(llm_latency);
    let _ = LLM_TOKENS_TOTAL.set(llm_tokens_total);
    let _ = ARTICLES_INGESTED.set(articles_ingested);
    let _ = CHATS_TOTAL.set(chats_total);
    let _ = CHAT_DURATION.set(chat_duration);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Gathers every metric from the registry and encodes it in the text
/// exposition format. If the registry has not been initialized or
/// encoding fails, returns an error message instead.
///
/// # Example
///
/// ```ignore
/// use linguanews::metrics::{init_metrics, export_metrics};
///
/// init_metrics().expect("Failed to init");
/// println!("{}", export_metrics());
/// ```
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
