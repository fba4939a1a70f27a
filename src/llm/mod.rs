//! LLM integration for linguanews.
//!
//! One HTTP client speaks to any OpenAI-compatible completions endpoint;
//! the task-facing collaborators are thin prompt layers on top of it:
//!
//! ```text
//!   ChatClient ──► /chat/completions
//!       ▲
//!       ├── LlmTranslator      level-graded French translation
//!       ├── LlmQueryAnalyzer   intent + retrieval topic
//!       └── LlmGenerator       learner-facing replies
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use linguanews::llm::{ChatClient, LlmTranslator, Translator};
//! use linguanews::storage::CefrLevel;
//!
//! let client = Arc::new(ChatClient::from_env()?);
//! let translator = LlmTranslator::new(client);
//! let translation = translator
//!     .translate("Markets rally", "Stocks rose sharply today.", CefrLevel::B1)
//!     .await?;
//! ```
//!
//! Everything downstream depends on the [`ChatModel`] trait rather than
//! the concrete client, so tests script replies without a network.

pub mod analyzer;
pub mod client;
pub mod generator;
pub mod translator;

pub use analyzer::LlmQueryAnalyzer;
pub use client::{
    ChatClient, ChatModel, ChatRequest, ChatResponse, Message, Usage, DEFAULT_CHAT_MODEL,
};
pub use generator::LlmGenerator;
pub use translator::{LlmTranslator, Translation, Translator};
