//! Engine assembly and the public operations surface.
//!
//! [`NewsEngine`] wires the queue, store, collaborators, worker pool, and
//! scheduler together and exposes the operations the CLI (or any embedding
//! program) talks to:
//!
//! - [`trigger`](NewsEngine::trigger): validate a payload and enqueue it,
//!   returning the job id
//! - [`job_status`](NewsEngine::job_status): look up a job's lifecycle
//!   record
//! - [`health`](NewsEngine::health): lane backlogs, pool counters, and
//!   store size
//! - [`chat`](NewsEngine::chat): run the conversation graph; failures
//!   surface as a learner-facing apology instead of an error
//!
//! Construction comes in two flavors: [`NewsEngine::new`] takes explicit
//! collaborators (tests, embedders), [`NewsEngine::from_config`] wires the
//! production stack from an [`EngineConfig`].

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collectors::{Fetcher, RssFetcher};
use crate::config::{ConfigError, EngineConfig};
use crate::conversation::{
    ChatOutcome, ConversationGraph, GraphConfig, QueryAnalyzer, QueryIntent, ResponseGenerator,
};
use crate::embedding::{Embedder, HttpEmbedder};
use crate::error::TaskError;
use crate::llm::{ChatClient, ChatModel, LlmGenerator, LlmQueryAnalyzer, LlmTranslator, Translator};
use crate::metrics::MetricsCollector;
use crate::scheduler::{
    Beat, InMemoryQueue, Job, JobStatusReport, Lane, LaneStats, PoolError, PoolStats, QueueError,
    RedisQueue, ScheduleSpec, TaskPayload, Trigger, WorkQueue, WorkerPool,
};
use crate::storage::{ArticleStore, InMemoryArticleStore, PgArticleStore};
use crate::tasks::TaskRunner;

/// Reply returned to the learner when the conversation pipeline fails.
pub const FALLBACK_RESPONSE: &str =
    "Désolé, je rencontre un problème technique. Pouvez-vous réessayer dans un instant ?";

/// Errors crossing the engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Queue operation failed.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Store operation failed.
    #[error("Storage error: {0}")]
    Storage(#[source] TaskError),

    /// Worker pool lifecycle error.
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    /// A manual trigger carried invalid parameters.
    #[error("Rejected task: {0}")]
    InvalidPayload(#[source] TaskError),
}

/// Operator-facing snapshot of engine state.
#[derive(Debug, Clone)]
pub struct EngineHealth {
    /// Queue statistics per lane.
    pub lanes: Vec<LaneStats>,
    /// Worker pool counters.
    pub pool: PoolStats,
    /// Articles currently stored.
    pub stored_articles: u64,
}

impl EngineHealth {
    /// Jobs across all lanes that still expect an execution.
    pub fn total_backlog(&self) -> usize {
        self.lanes.iter().map(LaneStats::backlog).sum()
    }
}

/// The assembled engine: queue, store, graph, pool, and scheduler.
pub struct NewsEngine {
    config: EngineConfig,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn ArticleStore>,
    graph: ConversationGraph,
    pool: WorkerPool,
    shutdown_tx: broadcast::Sender<()>,
    beat_handle: Option<JoinHandle<()>>,
}

impl NewsEngine {
    /// Assembles an engine from explicit collaborators.
    ///
    /// The worker pool and scheduler are created but not started; call
    /// [`start`](Self::start) to run them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn ArticleStore>,
        fetcher: Arc<dyn Fetcher>,
        translator: Arc<dyn Translator>,
        embedder: Arc<dyn Embedder>,
        analyzer: Arc<dyn QueryAnalyzer>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let runner = Arc::new(TaskRunner::new(
            fetcher,
            translator,
            embedder.clone(),
            store.clone(),
            queue.clone(),
            config.level,
        ));

        let graph = ConversationGraph::new(analyzer, embedder, store.clone(), generator)
            .with_config(
                GraphConfig::default()
                    .with_top_k(config.top_k)
                    .with_min_similarity(config.min_similarity),
            );

        let pool = WorkerPool::new(config.worker_pool_config(), queue.clone(), runner)
            .with_retry_policy(config.retry_policy());

        // Buffer size of 1 is sufficient since the shutdown signal is sent once
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            queue,
            store,
            graph,
            pool,
            shutdown_tx,
            beat_handle: None,
        }
    }

    /// Wires the production stack described by `config`.
    ///
    /// Backend selection: Redis queue when `redis_url` is set, otherwise
    /// in-memory; Postgres store (with migrations applied) when
    /// `database_url` is set, otherwise in-memory. The LLM stack requires
    /// `llm_api_base`; the embedder reuses it unless `embedding_api_base`
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when validation fails, `llm_api_base` is unset,
    /// or a backend connection cannot be established.
    pub async fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let queue: Arc<dyn WorkQueue> = match &config.redis_url {
            Some(url) => {
                Arc::new(RedisQueue::connect(url, &config.queue_namespace).await?)
            }
            None => {
                info!("REDIS_URL not set, using in-memory queue");
                Arc::new(InMemoryQueue::new())
            }
        };

        let store: Arc<dyn ArticleStore> = match &config.database_url {
            Some(url) => {
                let store = PgArticleStore::connect(url)
                    .await
                    .map_err(EngineError::Storage)?;
                store.run_migrations().await.map_err(EngineError::Storage)?;
                Arc::new(store)
            }
            None => {
                info!("DATABASE_URL not set, using in-memory store");
                Arc::new(InMemoryArticleStore::new())
            }
        };

        let api_base = config.llm_api_base.clone().ok_or_else(|| {
            EngineError::Config(ConfigError::MissingEnvVar("LLM_API_BASE".to_string()))
        })?;
        let chat_client: Arc<dyn ChatModel> = Arc::new(
            ChatClient::new(&api_base, config.llm_api_key.clone())
                .with_default_model(&config.chat_model),
        );

        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
            config
                .embedding_api_base
                .clone()
                .unwrap_or_else(|| api_base.clone()),
            config
                .embedding_api_key
                .clone()
                .or_else(|| config.llm_api_key.clone()),
            &config.embedding_model,
        ));

        let fetcher: Arc<dyn Fetcher> = Arc::new(
            RssFetcher::new(&config.feed_url).with_full_pages(config.fetch_full_pages),
        );

        let translator: Arc<dyn Translator> = Arc::new(LlmTranslator::new(chat_client.clone()));
        let analyzer: Arc<dyn QueryAnalyzer> = Arc::new(LlmQueryAnalyzer::new(chat_client.clone()));
        let generator: Arc<dyn ResponseGenerator> = Arc::new(LlmGenerator::new(chat_client));

        Ok(Self::new(
            config, queue, store, fetcher, translator, embedder, analyzer, generator,
        ))
    }

    /// The recurring schedule driven by this engine's configuration.
    fn default_schedule(config: &EngineConfig) -> Vec<ScheduleSpec> {
        vec![
            ScheduleSpec::new(
                "ingest-news",
                TaskPayload::IngestNews {
                    limit: config.fetch_limit,
                },
                Trigger::Every(config.ingest_interval),
            ),
            ScheduleSpec::new(
                "health-check",
                TaskPayload::HealthCheck,
                Trigger::Every(config.health_interval),
            ),
            ScheduleSpec::new(
                "cleanup",
                TaskPayload::Cleanup {
                    retention_days: config.retention_days,
                },
                Trigger::DailyAt(config.cleanup_time),
            ),
        ]
    }

    /// Starts the worker pool and the scheduling loop.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the engine was already
    /// started.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.pool.start().await?;

        let mut beat =
            Beat::new(self.queue.clone()).with_max_attempts(self.config.max_attempts);
        for spec in Self::default_schedule(&self.config) {
            beat.register(spec);
        }
        self.beat_handle = Some(tokio::spawn(beat.run(self.shutdown_tx.subscribe())));

        info!(
            ingest_interval_secs = self.config.ingest_interval.as_secs(),
            health_interval_secs = self.config.health_interval.as_secs(),
            cleanup_time = %self.config.cleanup_time,
            "Engine started"
        );
        Ok(())
    }

    /// Stops the scheduler and waits for workers to finish their
    /// current jobs.
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        // Ignore send error - the beat may have already stopped
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.beat_handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Beat task panicked during shutdown");
            }
        }
        self.pool.shutdown().await?;
        Ok(())
    }

    /// Whether the worker pool is running.
    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    /// The configuration this engine was assembled from.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates a payload and enqueues it, returning the job id.
    ///
    /// The lane is derived from the payload. Malformed parameters are
    /// rejected here so they never consume a worker attempt.
    pub async fn trigger(&self, payload: TaskPayload) -> Result<Uuid, EngineError> {
        payload.validate().map_err(EngineError::InvalidPayload)?;

        let job = Job::new(payload).with_max_attempts(self.config.max_attempts);
        let job_id = job.id;
        let lane = job.lane;
        let task = job.payload.kind();
        self.queue.enqueue(job).await?;

        info!(job_id = %job_id, lane = %lane, task = task, "Manual trigger accepted");
        Ok(job_id)
    }

    /// Looks up the lifecycle record of a job.
    ///
    /// Returns `None` for unknown ids and for terminal records whose
    /// retention window has passed.
    pub async fn job_status(&self, job_id: Uuid) -> Result<Option<JobStatusReport>, EngineError> {
        Ok(self.queue.job_status(job_id).await?)
    }

    /// Collects queue, pool, and store statistics.
    pub async fn health(&self) -> Result<EngineHealth, EngineError> {
        let mut lanes = Vec::with_capacity(Lane::ALL.len());
        for lane in Lane::ALL {
            lanes.push(self.queue.stats(lane).await?);
        }
        let stored_articles = self.store.count().await.map_err(EngineError::Storage)?;

        Ok(EngineHealth {
            lanes,
            pool: self.pool.stats(),
            stored_articles,
        })
    }

    /// Answers a learner query through the conversation graph.
    ///
    /// Never fails: when any stage errors the learner receives
    /// [`FALLBACK_RESPONSE`] and the error detail goes to the log.
    pub async fn chat(&self, query: &str) -> ChatOutcome {
        let started = Instant::now();
        match self.graph.run(query, self.config.level).await {
            Ok(outcome) => {
                MetricsCollector::record_chat(outcome.intent.as_str(), started.elapsed());
                outcome
            }
            Err(error) => {
                warn!(
                    error = %error,
                    error_kind = error.kind(),
                    "Chat pipeline failed, returning fallback reply"
                );
                MetricsCollector::record_chat("fallback", started.elapsed());
                ChatOutcome {
                    response: FALLBACK_RESPONSE.to_string(),
                    intent: QueryIntent::GeneralChat,
                    sources: Vec::new(),
                    trace: Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::FetchedArticle;
    use crate::conversation::{QueryAnalysis, QueryState, Stage};
    use crate::embedding::HashEmbedder;
    use crate::scheduler::JobStatus;
    use crate::storage::CefrLevel;
    use async_trait::async_trait;

    struct EmptyFetcher;

    #[async_trait]
    impl Fetcher for EmptyFetcher {
        async fn fetch(&self, _limit: usize) -> Result<Vec<FetchedArticle>, TaskError> {
            Ok(Vec::new())
        }
    }

    struct EchoTranslator;

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(
            &self,
            title: &str,
            content: &str,
            _level: CefrLevel,
        ) -> Result<crate::llm::Translation, TaskError> {
            Ok(crate::llm::Translation {
                title: format!("FR: {title}"),
                content: format!("FR: {content}"),
            })
        }
    }

    struct FixedAnalyzer {
        intent: QueryIntent,
    }

    #[async_trait]
    impl QueryAnalyzer for FixedAnalyzer {
        async fn analyze(&self, query: &str) -> Result<QueryAnalysis, TaskError> {
            let mut analysis = QueryAnalysis::fallback(query);
            analysis.intent = self.intent;
            Ok(analysis)
        }
    }

    struct FixedGenerator {
        reply: Option<String>,
    }

    #[async_trait]
    impl ResponseGenerator for FixedGenerator {
        async fn generate(&self, _state: &QueryState) -> Result<String, TaskError> {
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(TaskError::unavailable("llm", "boom")),
            }
        }
    }

    fn build_engine(intent: QueryIntent, reply: Option<String>) -> NewsEngine {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryArticleStore::new());
        NewsEngine::new(
            EngineConfig::default(),
            queue,
            store,
            Arc::new(EmptyFetcher),
            Arc::new(EchoTranslator),
            Arc::new(HashEmbedder::new()),
            Arc::new(FixedAnalyzer { intent }),
            Arc::new(FixedGenerator { reply }),
        )
    }

    #[tokio::test]
    async fn test_trigger_enqueues_and_reports_status() {
        let engine = build_engine(QueryIntent::GeneralChat, Some("Salut !".to_string()));

        let job_id = engine
            .trigger(TaskPayload::IngestNews { limit: 5 })
            .await
            .expect("trigger should enqueue");

        let status = engine
            .job_status(job_id)
            .await
            .expect("status lookup should work")
            .expect("job should have a record");
        assert_eq!(status.status, JobStatus::Pending);
        assert_eq!(status.task, "ingest_news");
        assert_eq!(status.lane, Lane::Ingestion);
    }

    #[tokio::test]
    async fn test_trigger_rejects_invalid_payload() {
        let engine = build_engine(QueryIntent::GeneralChat, Some("Salut !".to_string()));

        let result = engine.trigger(TaskPayload::IngestNews { limit: 0 }).await;
        assert!(matches!(result, Err(EngineError::InvalidPayload(_))));

        // Nothing was enqueued.
        let health = engine.health().await.expect("health should work");
        assert_eq!(health.total_backlog(), 0);
    }

    #[tokio::test]
    async fn test_job_status_unknown_id() {
        let engine = build_engine(QueryIntent::GeneralChat, Some("Salut !".to_string()));

        let status = engine
            .job_status(Uuid::new_v4())
            .await
            .expect("lookup should not fail");
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn test_health_reports_both_lanes() {
        let engine = build_engine(QueryIntent::GeneralChat, Some("Salut !".to_string()));
        engine
            .trigger(TaskPayload::HealthCheck)
            .await
            .expect("trigger should enqueue");

        let health = engine.health().await.expect("health should work");
        assert_eq!(health.lanes.len(), 2);
        assert_eq!(health.stored_articles, 0);
        assert_eq!(health.total_backlog(), 1);
        assert_eq!(health.pool.total_processed(), 0);
    }

    #[tokio::test]
    async fn test_chat_returns_generated_reply() {
        let engine = build_engine(QueryIntent::GeneralChat, Some("Salut !".to_string()));

        let outcome = engine.chat("Bonjour, comment ça va ?").await;
        assert_eq!(outcome.response, "Salut !");
        assert_eq!(outcome.intent, QueryIntent::GeneralChat);
        assert_eq!(outcome.trace, vec![Stage::AnalyzeQuery, Stage::GenerateResponse]);
    }

    #[tokio::test]
    async fn test_chat_failure_returns_french_fallback() {
        let engine = build_engine(QueryIntent::GeneralChat, None);

        let outcome = engine.chat("Bonjour !").await;
        assert_eq!(outcome.response, FALLBACK_RESPONSE);
        assert!(outcome.sources.is_empty());
        assert!(outcome.trace.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_returns_fallback() {
        let engine = build_engine(QueryIntent::GeneralChat, Some("Salut !".to_string()));

        let outcome = engine.chat("   ").await;
        assert_eq!(outcome.response, FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn test_start_and_shutdown_cycle() {
        let mut engine = build_engine(QueryIntent::GeneralChat, Some("Salut !".to_string()));
        assert!(!engine.is_running());

        engine.start().await.expect("start should succeed");
        assert!(engine.is_running());
        assert!(matches!(
            engine.start().await,
            Err(EngineError::Pool(PoolError::AlreadyRunning))
        ));

        engine.shutdown().await.expect("shutdown should succeed");
        assert!(!engine.is_running());
    }

    #[test]
    fn test_default_schedule_covers_all_recurring_tasks() {
        let config = EngineConfig::default()
            .with_fetch_limit(7)
            .with_retention_days(14);
        let specs = NewsEngine::default_schedule(&config);

        assert_eq!(specs.len(), 3);
        assert_eq!(
            specs[0].payload,
            TaskPayload::IngestNews { limit: 7 }
        );
        assert_eq!(specs[0].trigger, Trigger::Every(config.ingest_interval));
        assert_eq!(specs[1].payload, TaskPayload::HealthCheck);
        assert_eq!(
            specs[2].payload,
            TaskPayload::Cleanup { retention_days: 14 }
        );
        assert_eq!(specs[2].trigger, Trigger::DailyAt(config.cleanup_time));
    }
}
