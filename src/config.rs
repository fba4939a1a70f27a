//! Engine configuration.
//!
//! This module provides configuration for the whole engine: queue and
//! storage backends, the news feed, LLM endpoints, worker counts, retry
//! behavior, the recurring schedule, and retrieval tuning. Values come
//! from `Default`, environment variables via [`EngineConfig::from_env`],
//! or builder-style overrides.

use std::time::Duration;

use chrono::NaiveTime;
use thiserror::Error;

use crate::collectors::DEFAULT_FEED_URL;
use crate::llm::DEFAULT_CHAT_MODEL;
use crate::scheduler::{RetryPolicy, WorkerPoolConfig};
use crate::storage::CefrLevel;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for [`crate::engine::NewsEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Backends
    /// Redis connection URL. `None` selects the in-memory queue.
    pub redis_url: Option<String>,
    /// Key namespace prepended to every queue key.
    pub queue_namespace: String,
    /// PostgreSQL connection URL. `None` selects the in-memory store.
    pub database_url: Option<String>,

    // News feed
    /// RSS feed to ingest from.
    pub feed_url: String,
    /// Articles fetched per scheduled ingestion run.
    pub fetch_limit: usize,
    /// Whether to fetch full article pages instead of feed descriptions.
    pub fetch_full_pages: bool,

    // LLM
    /// Base URL of the OpenAI-compatible chat API.
    pub llm_api_base: Option<String>,
    /// API key for the chat API, when the gateway requires one.
    pub llm_api_key: Option<String>,
    /// Chat model used for translation, analysis, and generation.
    pub chat_model: String,
    /// Base URL of the embeddings API. Falls back to `llm_api_base`.
    pub embedding_api_base: Option<String>,
    /// API key for the embeddings API. Falls back to `llm_api_key`.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier.
    pub embedding_model: String,

    // Learner
    /// CEFR level translations and replies are targeted at.
    pub level: CefrLevel,

    // Workers
    /// Workers dedicated to the ingestion lane.
    pub ingestion_workers: usize,
    /// Workers dedicated to the maintenance lane.
    pub maintenance_workers: usize,
    /// Maximum time allowed for a single job execution.
    pub job_timeout: Duration,

    // Retry
    /// Attempt budget per job.
    pub max_attempts: u32,
    /// Backoff delay after the first failed attempt.
    pub retry_base_delay: Duration,
    /// Backoff growth factor per attempt.
    pub retry_multiplier: f64,
    /// Upper bound on the backoff delay.
    pub retry_max_delay: Duration,
    /// Jitter fraction applied to backoff delays.
    pub retry_jitter: f64,

    // Schedule
    /// How often the ingestion schedule fires.
    pub ingest_interval: Duration,
    /// How often the health check schedule fires.
    pub health_interval: Duration,
    /// UTC time of day the cleanup schedule fires.
    pub cleanup_time: NaiveTime,
    /// Articles older than this many days are deleted by cleanup.
    pub retention_days: u32,

    // Retrieval
    /// Articles retrieved per news-discussion query.
    pub top_k: usize,
    /// Similarity floor below which retrieved articles are dropped.
    pub min_similarity: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Backend defaults: in-memory everything
            redis_url: None,
            queue_namespace: "linguanews".to_string(),
            database_url: None,

            // Feed defaults
            feed_url: DEFAULT_FEED_URL.to_string(),
            fetch_limit: 10,
            fetch_full_pages: true,

            // LLM defaults
            llm_api_base: None,
            llm_api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_api_base: None,
            embedding_api_key: None,
            embedding_model: "text-embedding-3-small".to_string(),

            // Learner default
            level: CefrLevel::B1,

            // Worker defaults
            ingestion_workers: 2,
            maintenance_workers: 1,
            job_timeout: Duration::from_secs(600),

            // Retry defaults
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            retry_multiplier: 2.0,
            retry_max_delay: Duration::from_secs(300),
            retry_jitter: 0.2,

            // Schedule defaults: ingest and health every 5 minutes,
            // cleanup daily at 03:00 UTC
            ingest_interval: Duration::from_secs(300),
            health_interval: Duration::from_secs(300),
            cleanup_time: NaiveTime::from_hms_opt(3, 0, 0)
                .unwrap_or(NaiveTime::MIN),
            retention_days: 30,

            // Retrieval defaults
            top_k: 3,
            min_similarity: 0.2,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis connection URL (absent: in-memory queue)
    /// - `QUEUE_NAMESPACE`: queue key namespace (default: linguanews)
    /// - `DATABASE_URL`: PostgreSQL URL (absent: in-memory store)
    /// - `NEWS_FEED_URL`: RSS feed URL (default: BBC World News)
    /// - `NEWS_FETCH_LIMIT`: articles per scheduled run (default: 10)
    /// - `NEWS_FULL_PAGES`: fetch full article pages (default: true)
    /// - `LLM_API_BASE`: chat API base URL
    /// - `LLM_API_KEY`: chat API key
    /// - `LLM_CHAT_MODEL`: chat model (default: gpt-4o-mini)
    /// - `EMBEDDING_API_BASE`: embeddings API base (default: LLM_API_BASE)
    /// - `EMBEDDING_API_KEY`: embeddings API key (default: LLM_API_KEY)
    /// - `EMBEDDING_MODEL`: embedding model (default: text-embedding-3-small)
    /// - `TARGET_LEVEL`: CEFR level A1-C2 (default: B1)
    /// - `INGESTION_WORKERS`: ingestion lane workers (default: 2)
    /// - `MAINTENANCE_WORKERS`: maintenance lane workers (default: 1)
    /// - `JOB_TIMEOUT_SECS`: per-job execution timeout (default: 600)
    /// - `MAX_ATTEMPTS`: attempt budget per job (default: 3)
    /// - `RETRY_BASE_DELAY_SECS`: first backoff delay (default: 5)
    /// - `RETRY_MULTIPLIER`: backoff growth factor (default: 2.0)
    /// - `RETRY_MAX_DELAY_SECS`: backoff cap (default: 300)
    /// - `RETRY_JITTER`: backoff jitter fraction (default: 0.2)
    /// - `INGEST_INTERVAL_SECS`: ingestion schedule period (default: 300)
    /// - `HEALTH_INTERVAL_SECS`: health check period (default: 300)
    /// - `CLEANUP_TIME`: daily cleanup time as HH:MM UTC (default: 03:00)
    /// - `RETENTION_DAYS`: article retention in days (default: 30)
    /// - `RETRIEVAL_TOP_K`: articles retrieved per query (default: 3)
    /// - `MIN_SIMILARITY`: retrieval similarity floor (default: 0.2)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Backends
        if let Ok(val) = std::env::var("REDIS_URL") {
            config.redis_url = Some(val);
        }

        if let Ok(val) = std::env::var("QUEUE_NAMESPACE") {
            config.queue_namespace = val;
        }

        if let Ok(val) = std::env::var("DATABASE_URL") {
            config.database_url = Some(val);
        }

        // News feed
        if let Ok(val) = std::env::var("NEWS_FEED_URL") {
            config.feed_url = val;
        }

        if let Ok(val) = std::env::var("NEWS_FETCH_LIMIT") {
            config.fetch_limit = parse_env_value(&val, "NEWS_FETCH_LIMIT")?;
        }

        if let Ok(val) = std::env::var("NEWS_FULL_PAGES") {
            config.fetch_full_pages = parse_env_bool(&val, "NEWS_FULL_PAGES")?;
        }

        // LLM
        if let Ok(val) = std::env::var("LLM_API_BASE") {
            config.llm_api_base = Some(val);
        }

        if let Ok(val) = std::env::var("LLM_API_KEY") {
            config.llm_api_key = Some(val);
        }

        if let Ok(val) = std::env::var("LLM_CHAT_MODEL") {
            config.chat_model = val;
        }

        if let Ok(val) = std::env::var("EMBEDDING_API_BASE") {
            config.embedding_api_base = Some(val);
        }

        if let Ok(val) = std::env::var("EMBEDDING_API_KEY") {
            config.embedding_api_key = Some(val);
        }

        if let Ok(val) = std::env::var("EMBEDDING_MODEL") {
            config.embedding_model = val;
        }

        // Learner
        if let Ok(val) = std::env::var("TARGET_LEVEL") {
            config.level = parse_env_value(&val, "TARGET_LEVEL")?;
        }

        // Workers
        if let Ok(val) = std::env::var("INGESTION_WORKERS") {
            config.ingestion_workers = parse_env_value(&val, "INGESTION_WORKERS")?;
        }

        if let Ok(val) = std::env::var("MAINTENANCE_WORKERS") {
            config.maintenance_workers = parse_env_value(&val, "MAINTENANCE_WORKERS")?;
        }

        if let Ok(val) = std::env::var("JOB_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "JOB_TIMEOUT_SECS")?;
            config.job_timeout = Duration::from_secs(secs);
        }

        // Retry
        if let Ok(val) = std::env::var("MAX_ATTEMPTS") {
            config.max_attempts = parse_env_value(&val, "MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("RETRY_BASE_DELAY_SECS") {
            let secs: u64 = parse_env_value(&val, "RETRY_BASE_DELAY_SECS")?;
            config.retry_base_delay = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("RETRY_MULTIPLIER") {
            config.retry_multiplier = parse_env_value(&val, "RETRY_MULTIPLIER")?;
        }

        if let Ok(val) = std::env::var("RETRY_MAX_DELAY_SECS") {
            let secs: u64 = parse_env_value(&val, "RETRY_MAX_DELAY_SECS")?;
            config.retry_max_delay = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("RETRY_JITTER") {
            config.retry_jitter = parse_env_value(&val, "RETRY_JITTER")?;
        }

        // Schedule
        if let Ok(val) = std::env::var("INGEST_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "INGEST_INTERVAL_SECS")?;
            config.ingest_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("HEALTH_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "HEALTH_INTERVAL_SECS")?;
            config.health_interval = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("CLEANUP_TIME") {
            config.cleanup_time = parse_cleanup_time(&val, "CLEANUP_TIME")?;
        }

        if let Ok(val) = std::env::var("RETENTION_DAYS") {
            config.retention_days = parse_env_value(&val, "RETENTION_DAYS")?;
        }

        // Retrieval
        if let Ok(val) = std::env::var("RETRIEVAL_TOP_K") {
            config.top_k = parse_env_value(&val, "RETRIEVAL_TOP_K")?;
        }

        if let Ok(val) = std::env::var("MIN_SIMILARITY") {
            config.min_similarity = parse_env_value(&val, "MIN_SIMILARITY")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_namespace.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_namespace cannot be empty".to_string(),
            ));
        }

        if self.feed_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "feed_url cannot be empty".to_string(),
            ));
        }

        if self.fetch_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "fetch_limit must be at least 1".to_string(),
            ));
        }

        if self.chat_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "chat_model cannot be empty".to_string(),
            ));
        }

        if self.embedding_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "embedding_model cannot be empty".to_string(),
            ));
        }

        if self.ingestion_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "ingestion_workers must be at least 1".to_string(),
            ));
        }

        if self.maintenance_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "maintenance_workers must be at least 1".to_string(),
            ));
        }

        if self.job_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "job_timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.retry_multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "retry_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(ConfigError::ValidationFailed(
                "retry_base_delay cannot exceed retry_max_delay".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.retry_jitter) {
            return Err(ConfigError::ValidationFailed(
                "retry_jitter must be in [0.0, 1.0)".to_string(),
            ));
        }

        if self.ingest_interval.is_zero() || self.health_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "schedule intervals must be greater than 0".to_string(),
            ));
        }

        if self.retention_days == 0 {
            return Err(ConfigError::ValidationFailed(
                "retention_days must be at least 1".to_string(),
            ));
        }

        if self.top_k == 0 {
            return Err(ConfigError::ValidationFailed(
                "top_k must be at least 1".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(ConfigError::ValidationFailed(
                "min_similarity must be between -1.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// The retry policy described by the retry fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(self.retry_base_delay)
            .with_multiplier(self.retry_multiplier)
            .with_max_delay(self.retry_max_delay)
            .with_jitter(self.retry_jitter)
    }

    /// The worker pool configuration described by the worker fields.
    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::default()
            .with_ingestion_workers(self.ingestion_workers)
            .with_maintenance_workers(self.maintenance_workers)
            .with_job_timeout(self.job_timeout)
    }

    /// Builder method to set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Builder method to set the feed URL.
    pub fn with_feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = url.into();
        self
    }

    /// Builder method to set the per-run fetch limit.
    pub fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }

    /// Builder method to set the chat API base URL.
    pub fn with_llm_api_base(mut self, base: impl Into<String>) -> Self {
        self.llm_api_base = Some(base.into());
        self
    }

    /// Builder method to set the chat API key.
    pub fn with_llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.llm_api_key = Some(key.into());
        self
    }

    /// Builder method to set the chat model.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Builder method to set the target CEFR level.
    pub fn with_level(mut self, level: CefrLevel) -> Self {
        self.level = level;
        self
    }

    /// Builder method to set the ingestion worker count.
    pub fn with_ingestion_workers(mut self, n: usize) -> Self {
        self.ingestion_workers = n;
        self
    }

    /// Builder method to set the maintenance worker count.
    pub fn with_maintenance_workers(mut self, n: usize) -> Self {
        self.maintenance_workers = n;
        self
    }

    /// Builder method to set the job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Builder method to set the attempt budget.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Builder method to set the ingestion schedule period.
    pub fn with_ingest_interval(mut self, interval: Duration) -> Self {
        self.ingest_interval = interval;
        self
    }

    /// Builder method to set the health check period.
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Builder method to set the daily cleanup time.
    pub fn with_cleanup_time(mut self, time: NaiveTime) -> Self {
        self.cleanup_time = time;
        self
    }

    /// Builder method to set the retention window.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Builder method to set the retrieval result count.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Builder method to set the retrieval similarity floor.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

/// Parse a time-of-day in `HH:MM` or `HH:MM:SS` form.
fn parse_cleanup_time(value: &str, key: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected HH:MM, got '{}'", value),
        })
}
