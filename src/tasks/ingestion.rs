//! News ingestion pipeline.
//!
//! One batch run pulls recent feed items and pushes each new one
//! through translate, embed, store. Item failures are tolerated: the
//! batch keeps going and reports them, and the worker pool schedules
//! single-article retry jobs for the retryable ones. Only a run where
//! every item fails surfaces as a job-level error.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collectors::{FetchedArticle, Fetcher};
use crate::embedding::Embedder;
use crate::error::TaskError;
use crate::llm::Translator;
use crate::metrics::MetricsCollector;
use crate::storage::{ArticleRecord, ArticleStore, CefrLevel};

use super::report::IngestionReport;

/// Feed items scanned when retrying a single article by URL.
const SINGLE_RETRY_SCAN_LIMIT: usize = 50;

/// Fetch, translate, embed, and store news articles.
pub struct IngestionTask {
    fetcher: Arc<dyn Fetcher>,
    translator: Arc<dyn Translator>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ArticleStore>,
    level: CefrLevel,
}

impl IngestionTask {
    /// Creates an ingestion task over the given collaborators.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        translator: Arc<dyn Translator>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ArticleStore>,
        level: CefrLevel,
    ) -> Self {
        Self {
            fetcher,
            translator,
            embedder,
            store,
            level,
        }
    }

    /// Runs a batch ingestion: fetch up to `limit` items and process
    /// each one not already stored.
    pub async fn run_batch(&self, limit: usize) -> Result<IngestionReport, TaskError> {
        let fetched = self.fetcher.fetch(limit).await?;
        let mut report = IngestionReport::new(fetched.len());

        for article in fetched {
            match self.store.exists(&article.source_url).await {
                Ok(true) => {
                    debug!(url = %article.source_url, "Article already stored, skipping");
                    report.record_skip();
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    report.record_failure(&article.source_url, &err);
                    continue;
                }
            }

            match self.process_article(&article).await {
                Ok(()) => report.record_processed(),
                Err(err) => {
                    warn!(url = %article.source_url, error = %err, "Article processing failed");
                    report.record_failure(&article.source_url, &err);
                }
            }
        }

        if report.processed == 0 && report.skipped == 0 && !report.failures.is_empty() {
            let detail = format!("all {} fetched items failed", report.failed());
            return Err(if report.failures.iter().any(|f| f.retryable) {
                TaskError::unavailable("ingestion", detail)
            } else {
                TaskError::InvalidInput(detail)
            });
        }

        info!(
            fetched = report.fetched,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed(),
            "Ingestion batch finished"
        );
        MetricsCollector::record_articles_ingested(report.processed);
        Ok(report)
    }

    /// Processes one article by URL. Used by item-level retry jobs; the
    /// article is looked up in the current feed, so an item that has
    /// rotated out is a permanent failure.
    pub async fn run_single(&self, url: &str) -> Result<IngestionReport, TaskError> {
        let mut report = IngestionReport::new(0);

        if self.store.exists(url).await? {
            debug!(url = %url, "Article already stored, skipping retry");
            report.record_skip();
            return Ok(report);
        }

        let fetched = self.fetcher.fetch(SINGLE_RETRY_SCAN_LIMIT).await?;
        let article = fetched
            .into_iter()
            .find(|a| a.source_url == url)
            .ok_or_else(|| {
                TaskError::InvalidInput(format!("article no longer in feed: {url}"))
            })?;

        report.fetched = 1;
        self.process_article(&article).await?;
        report.record_processed();
        MetricsCollector::record_articles_ingested(1);
        Ok(report)
    }

    async fn process_article(&self, article: &FetchedArticle) -> Result<(), TaskError> {
        let translation = self
            .translator
            .translate(&article.title, &article.content, self.level)
            .await?;

        let text = embedding_text(&translation.title, &translation.content);
        let vector = self.embedder.embed(&text).await?;

        let mut record = ArticleRecord::new(&article.source_url, &article.title, &article.content)
            .with_translation(&translation.title, &translation.content)
            .with_embedding(vector)
            .with_level(self.level);
        if let Some(published) = article.published_at {
            record = record.with_published_at(published);
        }

        self.store.upsert(&record).await?;
        debug!(url = %article.source_url, "Article stored");
        Ok(())
    }
}

// The headline carries most of the retrieval signal, so it is weighted
// by appearing twice ahead of the body.
fn embedding_text(title: &str, content: &str) -> String {
    format!("{title}\n{title}\n{content}")
}
