//! Payload dispatch for the worker pool.

use std::sync::Arc;

use async_trait::async_trait;

use crate::collectors::Fetcher;
use crate::embedding::Embedder;
use crate::error::TaskError;
use crate::llm::Translator;
use crate::scheduler::{JobExecutor, TaskPayload, WorkQueue};
use crate::storage::{ArticleStore, CefrLevel};

use super::ingestion::IngestionTask;
use super::maintenance::MaintenanceTask;
use super::report::TaskReport;

/// Maps queue payloads onto task implementations.
///
/// This is the [`JobExecutor`] the worker pool runs. Dispatch is a
/// match over [`TaskPayload`], so an unhandled variant is a compile
/// error rather than a runtime surprise.
pub struct TaskRunner {
    ingestion: IngestionTask,
    maintenance: MaintenanceTask,
}

impl TaskRunner {
    /// Wires the runner over its collaborators.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        translator: Arc<dyn Translator>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ArticleStore>,
        queue: Arc<dyn WorkQueue>,
        level: CefrLevel,
    ) -> Self {
        Self {
            ingestion: IngestionTask::new(
                fetcher,
                translator,
                embedder.clone(),
                store.clone(),
                level,
            ),
            maintenance: MaintenanceTask::new(store, embedder, queue),
        }
    }

    /// Runs the task for `payload` and returns its report.
    pub async fn run_task(&self, payload: &TaskPayload) -> Result<TaskReport, TaskError> {
        match payload {
            TaskPayload::IngestNews { limit } => Ok(TaskReport::Ingestion(
                self.ingestion.run_batch(*limit).await?,
            )),
            TaskPayload::IngestArticle { url } => Ok(TaskReport::Ingestion(
                self.ingestion.run_single(url).await?,
            )),
            TaskPayload::HealthCheck => {
                Ok(TaskReport::Health(self.maintenance.health_check().await?))
            }
            TaskPayload::Cleanup { retention_days } => Ok(TaskReport::Cleanup(
                self.maintenance.cleanup(*retention_days).await?,
            )),
        }
    }
}

#[async_trait]
impl JobExecutor for TaskRunner {
    async fn execute(&self, payload: &TaskPayload) -> Result<TaskReport, TaskError> {
        self.run_task(payload).await
    }
}
