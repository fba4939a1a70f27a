//! Common types for news source collectors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// A raw article as pulled from a news source, before translation and
/// embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedArticle {
    /// Canonical URL of the article. Deduplication key.
    pub source_url: String,

    /// Original headline.
    pub title: String,

    /// Original body text. May be a feed summary when the full page
    /// could not be extracted.
    pub content: String,

    /// Publication time, when the source reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl FetchedArticle {
    /// Creates an article with the required fields.
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            content: content.into(),
            published_at: None,
        }
    }

    /// Sets the publication time.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// Pulls recent articles from a news source.
///
/// Ingestion depends on this trait rather than a concrete source, so
/// tests run against scripted fetchers and new sources slot in beside
/// the RSS one.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches up to `limit` recent articles, newest first.
    async fn fetch(&self, limit: usize) -> Result<Vec<FetchedArticle>, TaskError>;
}
