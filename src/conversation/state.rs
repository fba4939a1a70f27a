//! Conversation state carried through the routing graph.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::{CefrLevel, ScoredArticle};

/// What the user is asking for, decided by query analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// The user wants to talk about current news.
    NewsDiscussion,
    /// Small talk or a question unrelated to news.
    GeneralChat,
}

impl QueryIntent {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::NewsDiscussion => "news_discussion",
            QueryIntent::GeneralChat => "general_chat",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Language the user wrote their query in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLanguage {
    /// Query written in French.
    French,
    /// Query written in English.
    English,
}

/// Result of the query analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Routing intent.
    pub intent: QueryIntent,
    /// Topic to retrieve articles for, distilled from the query.
    pub topic: String,
    /// Language the user wrote in.
    pub language: QueryLanguage,
}

impl QueryAnalysis {
    /// Conservative analysis used when the analyzer cannot produce one:
    /// route through retrieval with the raw query as the topic.
    pub fn fallback(query: &str) -> Self {
        Self {
            intent: QueryIntent::NewsDiscussion,
            topic: query.to_string(),
            language: QueryLanguage::French,
        }
    }
}

/// A node of the conversation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Classify the query and distill a retrieval topic.
    AnalyzeQuery,
    /// Embed the topic and rank stored articles against it.
    RetrieveArticles,
    /// Produce the learner-facing reply.
    GenerateResponse,
    /// Terminal marker.
    Done,
}

impl Stage {
    /// Stable label for traces and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AnalyzeQuery => "analyze_query",
            Stage::RetrieveArticles => "retrieve_articles",
            Stage::GenerateResponse => "generate_response",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable state threaded through one graph run.
#[derive(Debug, Clone)]
pub struct QueryState {
    /// Raw user query.
    pub query: String,
    /// CEFR level the reply should target.
    pub level: CefrLevel,
    /// Filled by [`Stage::AnalyzeQuery`].
    pub analysis: Option<QueryAnalysis>,
    /// Filled by [`Stage::RetrieveArticles`], best match first.
    pub articles: Vec<ScoredArticle>,
    /// Filled by [`Stage::GenerateResponse`].
    pub response: Option<String>,
}

impl QueryState {
    /// Creates the initial state for a query.
    pub fn new(query: impl Into<String>, level: CefrLevel) -> Self {
        Self {
            query: query.into(),
            level,
            analysis: None,
            articles: Vec::new(),
            response: None,
        }
    }

    /// The analyzed intent, defaulting to news discussion before analysis.
    pub fn intent(&self) -> QueryIntent {
        self.analysis
            .as_ref()
            .map(|a| a.intent)
            .unwrap_or(QueryIntent::NewsDiscussion)
    }
}

/// Citation attached to a chat reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Translated headline of the cited article.
    pub title: String,
    /// Canonical URL of the cited article.
    pub url: String,
    /// Similarity between the query and the article.
    pub similarity: f32,
}

/// Final product of a graph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    /// Learner-facing reply text.
    pub response: String,
    /// Intent the reply was routed under.
    pub intent: QueryIntent,
    /// Articles cited by the reply, best match first.
    pub sources: Vec<SourceRef>,
    /// Stages visited, in order.
    pub trace: Vec<Stage>,
}
