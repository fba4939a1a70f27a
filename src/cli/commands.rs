//! CLI command definitions for linguanews.
//!
//! One long-running command (`run`) drives the scheduler and worker pool;
//! the remaining commands are one-shot operations against the shared queue
//! and store, mirroring what an operator would otherwise do over an admin
//! API: trigger ingestion, chat, inspect a job, check health, list news.

use crate::config::EngineConfig;
use crate::engine::NewsEngine;
use crate::scheduler::{
    InMemoryQueue, Job, Lane, RedisQueue, TaskPayload, WorkQueue,
};
use crate::storage::{ArticleStore, InMemoryArticleStore, PgArticleStore};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// French-learning news chat engine.
#[derive(Parser)]
#[command(name = "linguanews")]
#[command(about = "News ingestion and French-learning chat engine")]
#[command(version)]
#[command(
    long_about = "linguanews ingests news articles on a schedule, translates them into learner-level French, and answers questions about them.\n\nThe `run` command starts the scheduler and worker pool; the other commands are one-shot operations against the same queue and store.\n\nExample usage:\n  linguanews run\n  linguanews ingest --limit 10\n  linguanews chat \"quoi de neuf aujourd'hui ?\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the engine: scheduler and worker pool, until ctrl-c.
    #[command(alias = "serve")]
    Run,

    /// Enqueue a news ingestion job.
    #[command(alias = "process")]
    Ingest(IngestArgs),

    /// Ask the news chat a question.
    Chat(ChatArgs),

    /// Show the lifecycle record of a job.
    Status(StatusArgs),

    /// Check queue and store reachability and backlog.
    Health(HealthArgs),

    /// List recently ingested articles.
    News(NewsArgs),
}

/// Arguments for `linguanews ingest`.
#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// Maximum number of feed items to fetch. Defaults to NEWS_FETCH_LIMIT.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output JSON instead of human-readable text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `linguanews chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// The learner's message.
    pub message: String,

    /// Output the full chat outcome as JSON (response, intent, sources, trace).
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `linguanews status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Job id returned by `ingest` or logged by the scheduler.
    pub job_id: String,

    /// Output JSON instead of human-readable text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `linguanews health`.
#[derive(Parser, Debug)]
pub struct HealthArgs {
    /// Output JSON instead of human-readable text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `linguanews news`.
#[derive(Parser, Debug)]
pub struct NewsArgs {
    /// Maximum number of articles to list.
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    /// Output JSON instead of human-readable text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before
/// running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the linguanews CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run => run_engine_command().await,
        Commands::Ingest(args) => run_ingest_command(args).await,
        Commands::Chat(args) => run_chat_command(args).await,
        Commands::Status(args) => run_status_command(args).await,
        Commands::Health(args) => run_health_command(args).await,
        Commands::News(args) => run_news_command(args).await,
    }
}

/// Connects the queue backend selected by the configuration.
///
/// One-shot commands talk to the queue directly so they work without LLM
/// credentials. Without REDIS_URL the queue is process-local, which makes
/// enqueue/status commands mostly useful for smoke testing.
async fn connect_queue(config: &EngineConfig) -> anyhow::Result<Arc<dyn WorkQueue>> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(
            RedisQueue::connect(url, &config.queue_namespace).await?,
        )),
        None => {
            warn!("REDIS_URL not set; using a process-local queue invisible to other processes");
            Ok(Arc::new(InMemoryQueue::new()))
        }
    }
}

/// Connects the store backend selected by the configuration.
async fn connect_store(config: &EngineConfig) -> anyhow::Result<Arc<dyn ArticleStore>> {
    match &config.database_url {
        Some(url) => Ok(Arc::new(PgArticleStore::connect(url).await?)),
        None => Ok(Arc::new(InMemoryArticleStore::new())),
    }
}

async fn run_engine_command() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    let mut engine = NewsEngine::from_config(config).await?;
    engine.start().await?;

    println!("✓ Engine running (press ctrl-c to stop)");
    tokio::signal::ctrl_c().await?;
    info!("Received ctrl-c, shutting down");

    engine.shutdown().await?;
    println!("✓ Engine stopped");
    Ok(())
}

async fn run_ingest_command(args: IngestArgs) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    let queue = connect_queue(&config).await?;

    let limit = args.limit.unwrap_or(config.fetch_limit);
    let payload = TaskPayload::IngestNews { limit };
    payload.validate()?;

    let job = Job::new(payload).with_max_attempts(config.max_attempts);
    let job_id = job.id;
    queue.enqueue(job).await?;

    if args.json {
        #[derive(Serialize)]
        struct IngestOutput {
            status: String,
            job_id: Uuid,
            limit: usize,
        }

        let output = IngestOutput {
            status: "enqueued".to_string(),
            job_id,
            limit,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("✓ Ingestion job enqueued");
        println!("  Job id: {}", job_id);
        println!("  Limit:  {}", limit);
        println!("  Track it with: linguanews status {}", job_id);
    }
    Ok(())
}

async fn run_chat_command(args: ChatArgs) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    // The engine is never started: chat only needs the graph, not workers.
    let engine = NewsEngine::from_config(config).await?;

    let outcome = engine.chat(&args.message).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.response);
        if !outcome.sources.is_empty() {
            println!();
            println!("Sources:");
            for (i, source) in outcome.sources.iter().enumerate() {
                println!("  [{}] {} ({})", i + 1, source.title, source.url);
            }
        }
    }
    Ok(())
}

async fn run_status_command(args: StatusArgs) -> anyhow::Result<()> {
    let job_id: Uuid = args
        .job_id
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid job id: {}", args.job_id))?;

    let config = EngineConfig::from_env()?;
    let queue = connect_queue(&config).await?;

    let Some(report) = queue.job_status(job_id).await? else {
        if args.json {
            println!("{{\"status\":\"not_found\",\"job_id\":\"{job_id}\"}}");
        } else {
            println!("Job {} not found (unknown id or record expired)", job_id);
        }
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Job {}", report.job_id);
        println!("  Task:     {}", report.task);
        println!("  Lane:     {}", report.lane);
        println!("  Status:   {}", report.status);
        println!("  Attempts: {}", report.attempts);
        println!("  Created:  {}", report.created_at);
        println!("  Updated:  {}", report.updated_at);
        if let Some(not_before) = report.not_before {
            println!("  Delayed until: {}", not_before);
        }
        if let Some(result) = &report.result {
            println!("  Outcome:  {}", result.outcome);
            println!("  Duration: {}ms", result.duration_ms);
            if let Some(error) = &result.error {
                println!("  Error:    {}", error);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct HealthLaneOutput {
    lane: String,
    pending: usize,
    processing: usize,
    delayed: usize,
    dead_letter: usize,
}

#[derive(Debug, Clone, Serialize)]
struct HealthOutput {
    status: String,
    lanes: Vec<HealthLaneOutput>,
    stored_articles: u64,
}

async fn run_health_command(args: HealthArgs) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    let queue = connect_queue(&config).await?;
    let store = connect_store(&config).await?;

    let mut lanes = Vec::with_capacity(Lane::ALL.len());
    for lane in Lane::ALL {
        let stats = queue.stats(lane).await?;
        lanes.push(HealthLaneOutput {
            lane: lane.as_str().to_string(),
            pending: stats.pending,
            processing: stats.processing,
            delayed: stats.delayed,
            dead_letter: stats.dead_letter,
        });
    }
    let stored_articles = store.count().await?;

    if args.json {
        let output = HealthOutput {
            status: "healthy".to_string(),
            lanes,
            stored_articles,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("✓ Queue and store reachable");
        for lane in &lanes {
            println!(
                "  Lane {}: {} pending, {} processing, {} delayed, {} dead-letter",
                lane.lane, lane.pending, lane.processing, lane.delayed, lane.dead_letter
            );
        }
        println!("  Stored articles: {}", stored_articles);
    }
    Ok(())
}

async fn run_news_command(args: NewsArgs) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    let store = connect_store(&config).await?;

    let articles = store.recent(args.limit).await?;

    if args.json {
        #[derive(Serialize)]
        struct NewsEntry {
            id: Uuid,
            title: String,
            translated_title: String,
            url: String,
            level: String,
            fetched_at: String,
        }

        let entries: Vec<NewsEntry> = articles
            .iter()
            .map(|article| NewsEntry {
                id: article.id,
                title: article.title.clone(),
                translated_title: article.translated_title.clone(),
                url: article.source_url.clone(),
                level: article.level.to_string(),
                fetched_at: article.fetched_at.to_rfc3339(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if articles.is_empty() {
        println!("No articles stored yet.");
    } else {
        println!("Recent articles ({}):", articles.len());
        for article in &articles {
            println!("  {}  {}", article.fetched_at.format("%Y-%m-%d"), article.translated_title);
            println!("              {}", article.source_url);
        }
    }
    Ok(())
}
