//! HTTP client for OpenAI-compatible chat completion endpoints.
//!
//! Works against any gateway that speaks the `/chat/completions` shape
//! (LiteLLM proxies, OpenAI, OpenRouter). Higher layers depend on the
//! [`ChatModel`] trait so tests can script responses without a network.

use std::env;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::metrics::MetricsCollector;

/// Model used when `LLM_CHAT_MODEL` is unset.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for a chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model to use for generation.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 to 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl ChatRequest {
    /// Creates a new request with default sampling parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the nucleus sampling parameter.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// A completed chat response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated text content.
    pub content: String,
    /// Model that produced the response.
    pub model: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<Usage>,
}

/// Abstraction over chat completion backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Sends one completion request.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Model identifier used when the caller does not pick one.
    fn default_model(&self) -> &str;
}

/// Client for an OpenAI-compatible chat completion endpoint.
pub struct ChatClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    client: Client,
}

// Wire format for the completions endpoint.

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

impl ChatClient {
    /// Creates a client for the given endpoint. The API key is optional
    /// because self-hosted gateways often run without one.
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_base: api_base.into(),
            api_key,
            default_model: DEFAULT_CHAT_MODEL.to_string(),
            client,
        }
    }

    /// Creates a client from `LLM_API_BASE`, `LLM_API_KEY`, and
    /// `LLM_CHAT_MODEL`.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LLM_API_KEY").ok();
        let default_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());

        Ok(Self::new(api_base, api_key).with_default_model(default_model))
    }

    /// Replaces the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Endpoint base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn dispatch(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.api_base.trim_end_matches('/')
        );

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("Chat endpoint rate limited");
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("invalid response body: {e}")))?;

        let fallback_model = request.model;
        let content = api
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ParseError("response contained no choices".to_string()))?;

        Ok(ChatResponse {
            content,
            model: api.model.unwrap_or(fallback_model),
            usage: api.usage,
        })
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let model = request.model.clone();
        let started = Instant::now();
        let result = self.dispatch(request).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(LlmError::RateLimited) => "rate_limited",
            Err(LlmError::ApiError { .. }) => "api_error",
            Err(LlmError::ParseError(_)) => "parse_error",
            Err(_) => "transport_error",
        };
        MetricsCollector::record_llm_request("chat", &model, outcome, started.elapsed());
        if let Ok(response) = &result {
            if let Some(usage) = &response.usage {
                MetricsCollector::record_llm_tokens(
                    "chat",
                    u64::from(usage.prompt_tokens),
                    u64::from(usage.completion_tokens),
                );
            }
        }

        result
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::system("You are a tutor");
        assert_eq!(msg.role, "system");
        assert_eq!(msg.content, "You are a tutor");

        let msg = Message::user("Bonjour");
        assert_eq!(msg.role, "user");

        let msg = Message::assistant("Salut !");
        assert_eq!(msg.role, "assistant");
    }

    #[test]
    fn test_request_serialization_skips_unset_params() {
        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "gpt-4o-mini");
        assert!(value.get("temperature").is_none());
        assert!(value.get("max_tokens").is_none());
        assert!(value.get("top_p").is_none());

        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")])
            .with_temperature(0.3)
            .with_max_tokens(800);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["temperature"], 0.3);
        assert_eq!(value["max_tokens"], 800);
        assert!(value.get("top_p").is_none());
    }

    #[test]
    fn test_error_body_parsing() {
        let body = r#"{"error": {"message": "model not found", "type": "invalid_request_error"}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.error.and_then(|e| e.message).as_deref(),
            Some("model not found")
        );
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Bonjour !"}}],
            "model": "gpt-4o-mini",
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Bonjour !")
        );
        assert_eq!(parsed.usage.map(|u| u.total_tokens), Some(16));
    }

    #[tokio::test]
    async fn test_connection_error_surfaces_as_request_failure() {
        // Nothing listens here, so the request fails at the transport.
        let client = ChatClient::new("http://localhost:65535", None);
        let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);

        let err = client.complete(request).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }

    #[test]
    fn test_default_model_override() {
        let client = ChatClient::new("http://localhost:4000", None).with_default_model("mistral");
        assert_eq!(client.default_model(), "mistral");
        assert_eq!(client.api_base(), "http://localhost:4000");
    }
}
