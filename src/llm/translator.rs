//! Level-graded French translation of article text.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TaskError;
use crate::storage::CefrLevel;

use super::client::{ChatModel, ChatRequest, Message};

/// System prompt applied to every translation chunk.
const TRANSLATION_PROMPT: &str = "You are a professional translator working for French learners.
Translate the text the user sends into French suitable for a {level} learner ({level_description}).
Keep names, numbers, dates, and facts exact. Prefer vocabulary and sentence
length appropriate for the level. Return only the translation, with no
commentary and no quotation marks around it.";

/// Default chunk size in characters. Long articles are translated in
/// pieces so a single request stays well inside the context window.
const DEFAULT_MAX_CHUNK_CHARS: usize = 3000;

const TRANSLATION_TEMPERATURE: f32 = 0.3;

/// A translated title/body pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Translated headline.
    pub title: String,
    /// Translated body text.
    pub content: String,
}

/// Translates article text into level-appropriate French.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates a headline and body for the given learner level.
    async fn translate(
        &self,
        title: &str,
        content: &str,
        level: CefrLevel,
    ) -> Result<Translation, TaskError>;
}

/// [`Translator`] backed by a chat model.
pub struct LlmTranslator {
    client: Arc<dyn ChatModel>,
    max_chunk_chars: usize,
}

impl LlmTranslator {
    /// Creates a translator over the given chat model.
    pub fn new(client: Arc<dyn ChatModel>) -> Self {
        Self {
            client,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }

    /// Overrides the per-request chunk size.
    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars.max(1);
        self
    }

    async fn translate_text(&self, text: &str, level: CefrLevel) -> Result<String, TaskError> {
        let system = TRANSLATION_PROMPT
            .replace("{level}", level.as_str())
            .replace("{level_description}", level.description());

        let chunks = split_into_chunks(text, self.max_chunk_chars);
        debug!(chunks = chunks.len(), level = %level, "Translating text");

        let mut parts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let request = ChatRequest::new(
                self.client.default_model(),
                vec![Message::system(system.as_str()), Message::user(chunk)],
            )
            .with_temperature(TRANSLATION_TEMPERATURE);

            let response = self.client.complete(request).await?;
            parts.push(response.content.trim().to_string());
        }

        Ok(parts.join(" "))
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(
        &self,
        title: &str,
        content: &str,
        level: CefrLevel,
    ) -> Result<Translation, TaskError> {
        if title.trim().is_empty() && content.trim().is_empty() {
            return Err(TaskError::InvalidInput("nothing to translate".to_string()));
        }

        let translated_title = if title.trim().is_empty() {
            String::new()
        } else {
            self.translate_text(title, level).await?
        };
        let translated_content = if content.trim().is_empty() {
            String::new()
        } else {
            self.translate_text(content, level).await?
        };

        Ok(Translation {
            title: translated_title,
            content: translated_content,
        })
    }
}

/// Splits text into chunks of at most `max_chars` characters, breaking at
/// sentence boundaries where possible. A single sentence longer than the
/// limit is hard-split on character boundaries.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in text.split_inclusive(['.', '!', '?', '\n']) {
        let sentence_len = sentence.chars().count();

        if current_len + sentence_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if sentence_len > max_chars {
            let chars: Vec<char> = sentence.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
        } else {
            current.push_str(sentence);
            current_len += sentence_len;
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}
