//! In-memory article store.
//!
//! Backs tests and offline development with the same `ArticleStore`
//! contract as the PostgreSQL store, including URL-keyed upsert semantics
//! and cosine-ranked similarity search.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::TaskError;

use super::article::{ArticleRecord, ArticleStore, ScoredArticle};

/// Article store backed by a process-local map keyed by source URL.
#[derive(Debug, Default)]
pub struct InMemoryArticleStore {
    articles: RwLock<HashMap<String, ArticleRecord>>,
}

impl InMemoryArticleStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticleStore for InMemoryArticleStore {
    async fn upsert(&self, article: &ArticleRecord) -> Result<(), TaskError> {
        self.articles
            .write()
            .await
            .insert(article.source_url.clone(), article.clone());
        Ok(())
    }

    async fn exists(&self, source_url: &str) -> Result<bool, TaskError> {
        Ok(self.articles.read().await.contains_key(source_url))
    }

    async fn get(&self, id: Uuid) -> Result<Option<ArticleRecord>, TaskError> {
        Ok(self
            .articles
            .read()
            .await
            .values()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn similar(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredArticle>, TaskError> {
        if embedding.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredArticle> = self
            .articles
            .read()
            .await
            .values()
            .filter(|a| !a.embedding.is_empty())
            .map(|a| ScoredArticle {
                similarity: cosine_similarity(embedding, &a.embedding),
                article: a.clone(),
            })
            .collect();

        scored.sort_by_key(|s| std::cmp::Reverse(OrderedFloat(s.similarity)));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ArticleRecord>, TaskError> {
        let mut articles: Vec<ArticleRecord> =
            self.articles.read().await.values().cloned().collect();
        articles.sort_by_key(|a| std::cmp::Reverse(a.fetched_at));
        articles.truncate(limit);
        Ok(articles)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, TaskError> {
        let mut articles = self.articles.write().await;
        let before = articles.len();
        articles.retain(|_, a| a.fetched_at >= cutoff);
        Ok((before - articles.len()) as u64)
    }

    async fn count(&self) -> Result<u64, TaskError> {
        Ok(self.articles.read().await.len() as u64)
    }

    async fn ping(&self) -> Result<(), TaskError> {
        Ok(())
    }
}
