//! Query intent classification.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::conversation::{QueryAnalysis, QueryAnalyzer, QueryIntent, QueryLanguage};
use crate::error::TaskError;

use super::client::{ChatModel, ChatRequest, Message};

const ANALYSIS_PROMPT: &str = r#"You classify queries for a French-learning news assistant.
Reply with one JSON object and nothing else, shaped like:
{"intent": "news_discussion", "topic": "short retrieval topic in English", "language": "french"}

"intent" is "news_discussion" when the user asks about current events or a
news topic, and "general_chat" for greetings, small talk, and language
questions. "language" is the language the query is written in, "french" or
"english". "topic" is a few English keywords to search articles with; for
general chat it may be empty."#;

const ANALYSIS_TEMPERATURE: f32 = 0.0;
const ANALYSIS_MAX_TOKENS: u32 = 200;

/// [`QueryAnalyzer`] backed by a chat model.
///
/// Classification is best-effort: any transport failure or unparseable
/// reply degrades to [`QueryAnalysis::fallback`], which routes through
/// retrieval with the raw query as the topic. A chat turn should never
/// fail because classification did.
pub struct LlmQueryAnalyzer {
    client: Arc<dyn ChatModel>,
}

// Lenient wire shape: models occasionally omit fields or wrap the JSON
// in prose, so mapping to the strict types happens by hand.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    intent: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    language: Option<String>,
}

impl LlmQueryAnalyzer {
    /// Creates an analyzer over the given chat model.
    pub fn new(client: Arc<dyn ChatModel>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryAnalyzer for LlmQueryAnalyzer {
    async fn analyze(&self, query: &str) -> Result<QueryAnalysis, TaskError> {
        if query.trim().is_empty() {
            return Err(TaskError::InvalidInput("empty query".to_string()));
        }

        let request = ChatRequest::new(
            self.client.default_model(),
            vec![Message::system(ANALYSIS_PROMPT), Message::user(query)],
        )
        .with_temperature(ANALYSIS_TEMPERATURE)
        .with_max_tokens(ANALYSIS_MAX_TOKENS);

        match self.client.complete(request).await {
            Ok(response) => match parse_analysis(&response.content, query) {
                Some(analysis) => {
                    debug!(intent = %analysis.intent, topic = %analysis.topic, "Query classified");
                    Ok(analysis)
                }
                None => {
                    warn!("Unparseable analysis reply, assuming news discussion");
                    Ok(QueryAnalysis::fallback(query))
                }
            },
            Err(err) => {
                warn!(error = %err, "Query analysis failed, assuming news discussion");
                Ok(QueryAnalysis::fallback(query))
            }
        }
    }
}

/// Extracts the JSON object between the first `{` and the last `}` so
/// fenced or prose-wrapped replies still parse.
fn parse_analysis(content: &str, query: &str) -> Option<QueryAnalysis> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }

    let raw: RawAnalysis = serde_json::from_str(&content[start..=end]).ok()?;

    let intent = match raw.intent.as_str() {
        "news_discussion" => QueryIntent::NewsDiscussion,
        "general_chat" => QueryIntent::GeneralChat,
        _ => return None,
    };
    let language = match raw.language.as_deref() {
        Some("english") => QueryLanguage::English,
        _ => QueryLanguage::French,
    };
    let topic = if raw.topic.trim().is_empty() {
        query.to_string()
    } else {
        raw.topic
    };

    Some(QueryAnalysis {
        intent,
        topic,
        language,
    })
}
