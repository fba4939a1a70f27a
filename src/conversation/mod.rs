//! Chat routing over ingested news.
//!
//! A learner query is classified, optionally grounded in retrieved
//! articles, and answered in French at the learner's level:
//!
//! ```text
//!   query ──► ConversationGraph ──► ChatOutcome { response, sources, trace }
//!                  │
//!                  ├─ QueryAnalyzer      (intent + topic)
//!                  ├─ Embedder + ArticleStore (retrieval)
//!                  └─ ResponseGenerator  (reply)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use linguanews::conversation::ConversationGraph;
//! use linguanews::storage::CefrLevel;
//!
//! let graph = ConversationGraph::new(analyzer, embedder, store, generator);
//! let outcome = graph.run("quoi de neuf sur les élections ?", CefrLevel::B1).await?;
//! println!("{}", outcome.response);
//! for source in &outcome.sources {
//!     println!("  [{}] {}", source.title, source.url);
//! }
//! ```

pub mod graph;
pub mod state;

pub use graph::{ConversationGraph, GraphConfig, QueryAnalyzer, ResponseGenerator};
pub use state::{
    ChatOutcome, QueryAnalysis, QueryIntent, QueryLanguage, QueryState, SourceRef, Stage,
};
