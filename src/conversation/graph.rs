//! Routing graph for chat queries.
//!
//! A query flows through an explicit graph of stages:
//!
//! ```text
//!   AnalyzeQuery ──(news_discussion)──► RetrieveArticles ──► GenerateResponse ──► Done
//!        │                                                        ▲
//!        └──────────────(general_chat)────────────────────────────┘
//! ```
//!
//! Transitions live in one table ([`ConversationGraph::next_stage`]) and
//! the interpreter records every visited stage, so a finished run carries
//! its own trace.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::TaskError;
use crate::storage::{ArticleStore, CefrLevel};

use super::state::{ChatOutcome, QueryAnalysis, QueryIntent, QueryState, SourceRef, Stage};

/// Classifies a query and distills a retrieval topic.
#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    /// Analyzes one user query.
    async fn analyze(&self, query: &str) -> Result<QueryAnalysis, TaskError>;
}

/// Produces the learner-facing reply from the accumulated state.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generates a reply for the query, citing `state.articles` when
    /// present.
    async fn generate(&self, state: &QueryState) -> Result<String, TaskError>;
}

/// Retrieval tuning for the graph.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// How many articles to retrieve at most.
    pub top_k: usize,
    /// Matches below this similarity are dropped.
    pub min_similarity: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_similarity: 0.2,
        }
    }
}

impl GraphConfig {
    /// Sets the retrieval depth.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the similarity floor.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }
}

/// Interpreter over the stage transition table.
pub struct ConversationGraph {
    analyzer: Arc<dyn QueryAnalyzer>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ArticleStore>,
    generator: Arc<dyn ResponseGenerator>,
    config: GraphConfig,
}

impl ConversationGraph {
    /// Creates a graph over the given collaborators with default tuning.
    pub fn new(
        analyzer: Arc<dyn QueryAnalyzer>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ArticleStore>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self {
            analyzer,
            embedder,
            store,
            generator,
            config: GraphConfig::default(),
        }
    }

    /// Replaces the retrieval tuning.
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// The transition table. Pure so routing can be tested without
    /// collaborators.
    pub fn next_stage(stage: Stage, state: &QueryState) -> Stage {
        match stage {
            Stage::AnalyzeQuery => match state.intent() {
                QueryIntent::NewsDiscussion => Stage::RetrieveArticles,
                QueryIntent::GeneralChat => Stage::GenerateResponse,
            },
            Stage::RetrieveArticles => Stage::GenerateResponse,
            Stage::GenerateResponse => Stage::Done,
            Stage::Done => Stage::Done,
        }
    }

    /// Runs a query through the graph and returns the reply with its
    /// sources and stage trace.
    pub async fn run(&self, query: &str, level: CefrLevel) -> Result<ChatOutcome, TaskError> {
        if query.trim().is_empty() {
            return Err(TaskError::InvalidInput("empty query".to_string()));
        }

        let mut state = QueryState::new(query, level);
        let mut trace = Vec::new();
        let mut stage = Stage::AnalyzeQuery;

        while stage != Stage::Done {
            trace.push(stage);
            self.execute(stage, &mut state).await?;
            stage = Self::next_stage(stage, &state);
        }

        let response = state
            .response
            .take()
            .ok_or_else(|| TaskError::unavailable("generator", "no response produced"))?;

        let sources = state
            .articles
            .iter()
            .map(|scored| {
                let title = if scored.article.translated_title.is_empty() {
                    scored.article.title.clone()
                } else {
                    scored.article.translated_title.clone()
                };
                SourceRef {
                    title,
                    url: scored.article.source_url.clone(),
                    similarity: scored.similarity,
                }
            })
            .collect::<Vec<_>>();

        info!(
            intent = %state.intent(),
            sources = sources.len(),
            stages = trace.len(),
            "Conversation graph completed"
        );

        Ok(ChatOutcome {
            response,
            intent: state.intent(),
            sources,
            trace,
        })
    }

    async fn execute(&self, stage: Stage, state: &mut QueryState) -> Result<(), TaskError> {
        match stage {
            Stage::AnalyzeQuery => {
                let analysis = self.analyzer.analyze(&state.query).await?;
                debug!(intent = %analysis.intent, topic = %analysis.topic, "Query analyzed");
                state.analysis = Some(analysis);
            }
            Stage::RetrieveArticles => {
                let topic = state
                    .analysis
                    .as_ref()
                    .map(|a| a.topic.as_str())
                    .unwrap_or(&state.query);
                let vector = self.embedder.embed(topic).await?;
                let hits = self.store.similar(&vector, self.config.top_k).await?;
                let retrieved = hits.len();
                state.articles = hits
                    .into_iter()
                    .filter(|h| h.similarity >= self.config.min_similarity)
                    .collect();
                debug!(
                    retrieved = retrieved,
                    kept = state.articles.len(),
                    "Articles retrieved"
                );
            }
            Stage::GenerateResponse => {
                state.response = Some(self.generator.generate(state).await?);
            }
            Stage::Done => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::storage::{ArticleRecord, InMemoryArticleStore};
    use crate::conversation::state::QueryLanguage;

    struct FixedAnalyzer(QueryAnalysis);

    #[async_trait]
    impl QueryAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _query: &str) -> Result<QueryAnalysis, TaskError> {
            Ok(self.0.clone())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl ResponseGenerator for EchoGenerator {
        async fn generate(&self, state: &QueryState) -> Result<String, TaskError> {
            Ok(format!("réponse avec {} sources", state.articles.len()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl ResponseGenerator for FailingGenerator {
        async fn generate(&self, _state: &QueryState) -> Result<String, TaskError> {
            Err(TaskError::unavailable("llm", "503"))
        }
    }

    fn news_analysis(topic: &str) -> QueryAnalysis {
        QueryAnalysis {
            intent: QueryIntent::NewsDiscussion,
            topic: topic.to_string(),
            language: QueryLanguage::French,
        }
    }

    fn chat_analysis() -> QueryAnalysis {
        QueryAnalysis {
            intent: QueryIntent::GeneralChat,
            topic: String::new(),
            language: QueryLanguage::French,
        }
    }

    async fn seeded_store(embedder: &HashEmbedder) -> Arc<InMemoryArticleStore> {
        let store = Arc::new(InMemoryArticleStore::new());
        let text = "election results government vote parliament";
        let embedding = embedder.embed(text).await.expect("embed");
        store
            .upsert(
                &ArticleRecord::new("https://news.example.org/election", "Election result", text)
                    .with_translation("Résultat des élections", "Texte traduit")
                    .with_embedding(embedding),
            )
            .await
            .expect("upsert");
        store
    }

    fn graph(
        analysis: QueryAnalysis,
        store: Arc<InMemoryArticleStore>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> ConversationGraph {
        ConversationGraph::new(
            Arc::new(FixedAnalyzer(analysis)),
            Arc::new(HashEmbedder::new()),
            store,
            generator,
        )
    }

    #[test]
    fn test_transition_table() {
        let mut state = QueryState::new("q", CefrLevel::B1);

        state.analysis = Some(news_analysis("election"));
        assert_eq!(
            ConversationGraph::next_stage(Stage::AnalyzeQuery, &state),
            Stage::RetrieveArticles
        );

        state.analysis = Some(chat_analysis());
        assert_eq!(
            ConversationGraph::next_stage(Stage::AnalyzeQuery, &state),
            Stage::GenerateResponse
        );

        assert_eq!(
            ConversationGraph::next_stage(Stage::RetrieveArticles, &state),
            Stage::GenerateResponse
        );
        assert_eq!(
            ConversationGraph::next_stage(Stage::GenerateResponse, &state),
            Stage::Done
        );
        assert_eq!(
            ConversationGraph::next_stage(Stage::Done, &state),
            Stage::Done
        );
    }

    #[tokio::test]
    async fn test_news_query_routes_through_retrieval() {
        let embedder = HashEmbedder::new();
        let store = seeded_store(&embedder).await;
        let graph = graph(
            news_analysis("election results government"),
            store,
            Arc::new(EchoGenerator),
        )
        .with_config(GraphConfig::default().with_min_similarity(0.1));

        let outcome = graph.run("what about the election?", CefrLevel::B1).await.unwrap();

        assert_eq!(
            outcome.trace,
            vec![
                Stage::AnalyzeQuery,
                Stage::RetrieveArticles,
                Stage::GenerateResponse
            ]
        );
        assert_eq!(outcome.intent, QueryIntent::NewsDiscussion);
        assert_eq!(outcome.sources.len(), 1);
        // The translated headline is preferred for citations.
        assert_eq!(outcome.sources[0].title, "Résultat des élections");
        assert_eq!(outcome.response, "réponse avec 1 sources");
    }

    #[tokio::test]
    async fn test_chat_query_skips_retrieval() {
        let store = Arc::new(InMemoryArticleStore::new());
        let graph = graph(chat_analysis(), store, Arc::new(EchoGenerator));

        let outcome = graph.run("bonjour !", CefrLevel::A2).await.unwrap();

        assert_eq!(
            outcome.trace,
            vec![Stage::AnalyzeQuery, Stage::GenerateResponse]
        );
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.response, "réponse avec 0 sources");
    }

    #[tokio::test]
    async fn test_similarity_floor_filters_weak_matches() {
        let embedder = HashEmbedder::new();
        let store = seeded_store(&embedder).await;
        let graph = graph(
            // A topic with no token overlap with the stored article.
            news_analysis("recette de cuisine dessert chocolat"),
            store,
            Arc::new(EchoGenerator),
        )
        .with_config(GraphConfig::default().with_min_similarity(0.9));

        let outcome = graph.run("une recette ?", CefrLevel::B1).await.unwrap();

        // Retrieval ran but nothing cleared the floor; the reply still
        // gets generated without sources.
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.response, "réponse avec 0 sources");
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let store = Arc::new(InMemoryArticleStore::new());
        let graph = graph(chat_analysis(), store, Arc::new(EchoGenerator));

        let err = graph.run("   ", CefrLevel::B1).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_generator_failure_propagates() {
        let store = Arc::new(InMemoryArticleStore::new());
        let graph = graph(chat_analysis(), store, Arc::new(FailingGenerator));

        let err = graph.run("bonjour", CefrLevel::B1).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
