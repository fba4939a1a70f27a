//! Article records and the store trait.
//!
//! Articles are keyed by their source URL: the record id is derived from
//! the URL with UUID v5, so re-ingesting the same article always lands on
//! the same row.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// CEFR proficiency level a translation is targeted at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum CefrLevel {
    /// Complete beginner.
    A1,
    /// Elementary.
    A2,
    /// Intermediate.
    #[default]
    B1,
    /// Upper intermediate.
    B2,
    /// Advanced.
    C1,
    /// Proficient.
    C2,
}

impl CefrLevel {
    /// Canonical label, e.g. `"B1"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        }
    }

    /// Learner-facing description used in prompts.
    pub fn description(&self) -> &'static str {
        match self {
            CefrLevel::A1 => "complete beginner",
            CefrLevel::A2 => "elementary",
            CefrLevel::B1 => "intermediate",
            CefrLevel::B2 => "upper intermediate",
            CefrLevel::C1 => "advanced",
            CefrLevel::C2 => "proficient",
        }
    }
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CefrLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A1" => Ok(CefrLevel::A1),
            "A2" => Ok(CefrLevel::A2),
            "B1" => Ok(CefrLevel::B1),
            "B2" => Ok(CefrLevel::B2),
            "C1" => Ok(CefrLevel::C1),
            "C2" => Ok(CefrLevel::C2),
            other => Err(format!("unknown CEFR level: {other}")),
        }
    }
}

/// A stored news article with its translation and embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Stable id derived from the source URL.
    pub id: Uuid,
    /// Canonical URL the article was fetched from. Unique per article.
    pub source_url: String,
    /// Original headline.
    pub title: String,
    /// Original body text.
    pub content: String,
    /// Headline translated for the learner.
    pub translated_title: String,
    /// Body translated for the learner.
    pub translated_content: String,
    /// Embedding of the article, empty until computed.
    pub embedding: Vec<f32>,
    /// CEFR level the translation targets.
    pub level: CefrLevel,
    /// Publication timestamp from the feed, when present.
    pub published_at: Option<DateTime<Utc>>,
    /// When the article was ingested.
    pub fetched_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// Derives the stable record id for a source URL.
    pub fn article_id(source_url: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, source_url.as_bytes())
    }

    /// Creates a record from fetched content. Translation and embedding
    /// start empty and are filled in by the pipeline.
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let source_url = source_url.into();
        Self {
            id: Self::article_id(&source_url),
            source_url,
            title: title.into(),
            content: content.into(),
            translated_title: String::new(),
            translated_content: String::new(),
            embedding: Vec::new(),
            level: CefrLevel::default(),
            published_at: None,
            fetched_at: Utc::now(),
        }
    }

    /// Sets the translated headline and body.
    pub fn with_translation(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.translated_title = title.into();
        self.translated_content = content.into();
        self
    }

    /// Sets the embedding vector.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Sets the CEFR level the translation targets.
    pub fn with_level(mut self, level: CefrLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the feed publication timestamp.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// An article paired with its similarity to a query embedding.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    /// The matched article.
    pub article: ArticleRecord,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}

/// Persistent article storage.
///
/// Implementations must treat `source_url` as the unique key: upserting a
/// record with an existing URL replaces that row instead of adding one.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Inserts or replaces an article keyed by its source URL.
    async fn upsert(&self, article: &ArticleRecord) -> Result<(), TaskError>;

    /// Whether an article with this source URL is already stored.
    async fn exists(&self, source_url: &str) -> Result<bool, TaskError>;

    /// Fetches an article by id.
    async fn get(&self, id: Uuid) -> Result<Option<ArticleRecord>, TaskError>;

    /// Returns up to `top_k` articles ranked by cosine similarity to the
    /// query embedding, best first. Articles without an embedding are
    /// skipped.
    async fn similar(&self, embedding: &[f32], top_k: usize)
        -> Result<Vec<ScoredArticle>, TaskError>;

    /// Returns the most recently fetched articles, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ArticleRecord>, TaskError>;

    /// Deletes articles fetched before `cutoff`, returning how many rows
    /// were removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, TaskError>;

    /// Number of stored articles.
    async fn count(&self) -> Result<u64, TaskError>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<(), TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_id_is_deterministic() {
        let a = ArticleRecord::article_id("https://news.example.org/2025/budget");
        let b = ArticleRecord::article_id("https://news.example.org/2025/budget");
        let c = ArticleRecord::article_id("https://news.example.org/2025/election");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_record_id_matches_url_derivation() {
        let record = ArticleRecord::new("https://news.example.org/a", "Title", "Body");
        assert_eq!(
            record.id,
            ArticleRecord::article_id("https://news.example.org/a")
        );
    }

    #[test]
    fn test_record_builders() {
        let published = Utc::now();
        let record = ArticleRecord::new("https://news.example.org/a", "Title", "Body")
            .with_translation("Titre", "Corps")
            .with_embedding(vec![0.1, 0.2])
            .with_level(CefrLevel::B2)
            .with_published_at(published);

        assert_eq!(record.translated_title, "Titre");
        assert_eq!(record.translated_content, "Corps");
        assert_eq!(record.embedding, vec![0.1, 0.2]);
        assert_eq!(record.level, CefrLevel::B2);
        assert_eq!(record.published_at, Some(published));
    }

    #[test]
    fn test_level_parse_roundtrip() {
        for level in [
            CefrLevel::A1,
            CefrLevel::A2,
            CefrLevel::B1,
            CefrLevel::B2,
            CefrLevel::C1,
            CefrLevel::C2,
        ] {
            let parsed: CefrLevel = level.as_str().parse().expect("level should parse");
            assert_eq!(parsed, level);
        }

        // Parsing is case insensitive.
        assert_eq!("b2".parse::<CefrLevel>(), Ok(CefrLevel::B2));
        assert!("Z9".parse::<CefrLevel>().is_err());
    }

    #[test]
    fn test_level_default_is_b1() {
        assert_eq!(CefrLevel::default(), CefrLevel::B1);
    }
}
