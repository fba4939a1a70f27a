//! High-level recording interface over the raw Prometheus metrics.
//!
//! Subsystems call the associated functions on [`MetricsCollector`] rather
//! than touching the metric statics directly, which keeps label sets
//! consistent in one place.

use std::time::Duration;

use super::prometheus::{
    ARTICLES_INGESTED, CHATS_TOTAL, CHAT_DURATION, JOBS_TOTAL, JOB_DURATION, LLM_LATENCY,
    LLM_REQUESTS_TOTAL, LLM_TOKENS_TOTAL, QUEUE_DEPTH,
};

/// Recorder for linguanews operational metrics.
///
/// Every function is a no-op until `init_metrics()` has run, so callers
/// never need to know whether metrics are enabled.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use linguanews::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// MetricsCollector::record_job("ingestion", "ingest_news", "succeeded", Duration::from_secs(42));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Record a settled job.
    ///
    /// # Arguments
    ///
    /// * `lane` - Queue lane the job ran on
    /// * `task` - Task kind (e.g. "ingest_news", "health_check")
    /// * `outcome` - Settlement outcome (e.g. "succeeded", "retried", "abandoned")
    /// * `duration` - Wall-clock execution time
    pub fn record_job(lane: &str, task: &str, outcome: &str, duration: Duration) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&[lane, task, outcome]).inc();
        }

        if let Some(job_duration) = JOB_DURATION.get() {
            job_duration
                .with_label_values(&[lane])
                .observe(duration.as_secs_f64());
        }

        tracing::trace!(
            lane = lane,
            task = task,
            outcome = outcome,
            duration_ms = duration.as_millis() as u64,
            "Recorded job metric"
        );
    }

    /// Update the backlog gauge for a lane.
    pub fn record_queue_depth(lane: &str, depth: usize) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth.with_label_values(&[lane]).set(depth as f64);
        }

        tracing::trace!(lane = lane, depth = depth, "Updated queue depth metric");
    }

    /// Record an LLM API request.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Provider endpoint ("chat" or "embeddings")
    /// * `model` - Model identifier the request was sent with
    /// * `outcome` - Request outcome (e.g. "ok", "rate_limited", "api_error")
    /// * `duration` - Request latency
    pub fn record_llm_request(endpoint: &str, model: &str, outcome: &str, duration: Duration) {
        if let Some(llm_requests) = LLM_REQUESTS_TOTAL.get() {
            llm_requests
                .with_label_values(&[endpoint, model, outcome])
                .inc();
        }

        if let Some(llm_latency) = LLM_LATENCY.get() {
            llm_latency
                .with_label_values(&[endpoint])
                .observe(duration.as_secs_f64());
        }

        tracing::trace!(
            endpoint = endpoint,
            model = model,
            outcome = outcome,
            duration_ms = duration.as_millis() as u64,
            "Recorded LLM request metric"
        );
    }

    /// Record token usage reported by a provider.
    pub fn record_llm_tokens(endpoint: &str, prompt_tokens: u64, completion_tokens: u64) {
        if let Some(llm_tokens) = LLM_TOKENS_TOTAL.get() {
            llm_tokens
                .with_label_values(&[endpoint, "prompt"])
                .inc_by(prompt_tokens as f64);
            llm_tokens
                .with_label_values(&[endpoint, "completion"])
                .inc_by(completion_tokens as f64);
        }

        tracing::trace!(
            endpoint = endpoint,
            prompt_tokens = prompt_tokens,
            completion_tokens = completion_tokens,
            "Recorded LLM token metric"
        );
    }

    /// Add newly stored articles to the ingestion counter.
    pub fn record_articles_ingested(count: usize) {
        if count == 0 {
            return;
        }

        if let Some(articles) = ARTICLES_INGESTED.get() {
            articles.inc_by(count as f64);
        }

        tracing::trace!(count = count, "Recorded ingested articles metric");
    }

    /// Record a completed chat turn.
    ///
    /// # Arguments
    ///
    /// * `intent` - Classified query intent (e.g. "news_discussion")
    /// * `duration` - End-to-end latency including retrieval and generation
    pub fn record_chat(intent: &str, duration: Duration) {
        if let Some(chats_total) = CHATS_TOTAL.get() {
            chats_total.with_label_values(&[intent]).inc();
        }

        if let Some(chat_duration) = CHAT_DURATION.get() {
            chat_duration.observe(duration.as_secs_f64());
        }

        tracing::trace!(
            intent = intent,
            duration_ms = duration.as_millis() as u64,
            "Recorded chat metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::init_metrics;

    fn ensure_metrics_init() {
        // Initialize metrics if not already done
        let _ = init_metrics();
    }

    #[test]
    fn test_record_job() {
        ensure_metrics_init();

        MetricsCollector::record_job("ingestion", "ingest_news", "succeeded", Duration::from_secs(42));
        MetricsCollector::record_job("ingestion", "ingest_article", "retried", Duration::from_secs(3));
        MetricsCollector::record_job("maintenance", "cleanup", "abandoned", Duration::from_millis(120));
    }

    #[test]
    fn test_record_queue_depth() {
        ensure_metrics_init();

        MetricsCollector::record_queue_depth("ingestion", 12);
        MetricsCollector::record_queue_depth("maintenance", 0);
        MetricsCollector::record_queue_depth("ingestion", 9);
    }

    #[test]
    fn test_record_llm_request() {
        ensure_metrics_init();

        MetricsCollector::record_llm_request("chat", "gpt-4o-mini", "ok", Duration::from_millis(850));
        MetricsCollector::record_llm_request(
            "embeddings",
            "text-embedding-3-small",
            "rate_limited",
            Duration::from_millis(40),
        );
    }

    #[test]
    fn test_record_llm_tokens() {
        ensure_metrics_init();

        MetricsCollector::record_llm_tokens("chat", 1200, 340);
        MetricsCollector::record_llm_tokens("chat", 0, 0);
    }

    #[test]
    fn test_record_articles_ingested() {
        ensure_metrics_init();

        MetricsCollector::record_articles_ingested(5);
        MetricsCollector::record_articles_ingested(0);
        MetricsCollector::record_articles_ingested(1);
    }

    #[test]
    fn test_record_chat() {
        ensure_metrics_init();

        MetricsCollector::record_chat("news_discussion", Duration::from_secs(4));
        MetricsCollector::record_chat("general_chat", Duration::from_millis(900));
    }

    #[test]
    fn test_recording_without_init_does_not_panic() {
        // Recorders are no-ops while the statics are unset; once another
        // test has initialized them this exercises the set path instead,
        // which must also not panic.
        MetricsCollector::record_job("ingestion", "ingest_news", "succeeded", Duration::ZERO);
        MetricsCollector::record_queue_depth("ingestion", 1);
        MetricsCollector::record_chat("general_chat", Duration::ZERO);
    }
}
