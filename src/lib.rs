//! linguanews: news ingestion and French-learning chat engine.
//!
//! This library ingests news articles on a recurring schedule, translates
//! them into learner-level French with embeddings for retrieval, and
//! answers learner questions through a staged conversation graph.

// Core modules
pub mod cli;
pub mod collectors;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod scheduler;
pub mod storage;
pub mod tasks;

// Re-export the types most embedding programs need
pub use config::EngineConfig;
pub use engine::{EngineError, EngineHealth, NewsEngine};
pub use error::TaskError;
