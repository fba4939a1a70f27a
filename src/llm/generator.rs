//! Learner-facing reply generation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::conversation::{QueryIntent, QueryLanguage, QueryState, ResponseGenerator};
use crate::error::TaskError;
use crate::storage::ScoredArticle;

use super::client::{ChatModel, ChatRequest, Message};

const NEWS_PROMPT: &str = "You are a friendly French tutor discussing current news with a learner.
Write your reply in French at {level} level ({level_description}).
Ground what you say in the numbered sources below and cite them inline as
[Source 1], [Source 2] and so on. Do not state facts that are not in the
sources. Keep the reply conversational and end with a short question that
invites the learner to continue.

{sources}";

const NO_SOURCES_NOTE: &str = "No stored articles matched this topic. Say so briefly in French and
suggest another news topic the learner could ask about.";

const CHAT_PROMPT: &str = "You are a friendly French tutor making conversation with a learner.
Write your reply in French at {level} level ({level_description}). Keep it
warm and short, gently rephrase the learner's mistakes when useful, and end
with a question that keeps the conversation going.";

const GLOSS_NOTE: &str = "The learner wrote in English, so add a short English gloss in
parentheses after any difficult French word or phrase.";

const GENERATION_TEMPERATURE: f32 = 0.7;
const GENERATION_MAX_TOKENS: u32 = 800;

/// How much of each article body goes into the prompt.
const EXCERPT_CHARS: usize = 600;

/// [`ResponseGenerator`] backed by a chat model.
pub struct LlmGenerator {
    client: Arc<dyn ChatModel>,
}

impl LlmGenerator {
    /// Creates a generator over the given chat model.
    pub fn new(client: Arc<dyn ChatModel>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseGenerator for LlmGenerator {
    async fn generate(&self, state: &QueryState) -> Result<String, TaskError> {
        let system = build_system(state);
        debug!(
            intent = %state.intent(),
            sources = state.articles.len(),
            "Generating reply"
        );

        let request = ChatRequest::new(
            self.client.default_model(),
            vec![Message::system(system), Message::user(state.query.as_str())],
        )
        .with_temperature(GENERATION_TEMPERATURE)
        .with_max_tokens(GENERATION_MAX_TOKENS);

        let response = self.client.complete(request).await?;
        let reply = response.content.trim().to_string();
        if reply.is_empty() {
            return Err(TaskError::unavailable("llm", "empty generation"));
        }
        Ok(reply)
    }
}

fn build_system(state: &QueryState) -> String {
    let level = state.level;
    let base = match state.intent() {
        QueryIntent::NewsDiscussion => {
            let sources = if state.articles.is_empty() {
                NO_SOURCES_NOTE.to_string()
            } else {
                format_sources(&state.articles)
            };
            NEWS_PROMPT
                .replace("{level}", level.as_str())
                .replace("{level_description}", level.description())
                .replace("{sources}", &sources)
        }
        QueryIntent::GeneralChat => CHAT_PROMPT
            .replace("{level}", level.as_str())
            .replace("{level_description}", level.description()),
    };

    let language = state
        .analysis
        .as_ref()
        .map(|a| a.language)
        .unwrap_or(QueryLanguage::French);
    match language {
        QueryLanguage::English => format!("{base}\n\n{GLOSS_NOTE}"),
        QueryLanguage::French => base,
    }
}

fn format_sources(articles: &[ScoredArticle]) -> String {
    let mut out = String::new();
    for (idx, scored) in articles.iter().enumerate() {
        let article = &scored.article;
        let title = if article.translated_title.is_empty() {
            &article.title
        } else {
            &article.translated_title
        };
        let body = if article.translated_content.is_empty() {
            &article.content
        } else {
            &article.translated_content
        };
        out.push_str(&format!(
            "[Source {}] {}\n{}\n\n",
            idx + 1,
            title,
            truncate_chars(body, EXCERPT_CHARS)
        ));
    }
    out.trim_end().to_string()
}

/// Truncates on a character boundary, never mid-codepoint.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
