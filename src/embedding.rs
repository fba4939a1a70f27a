//! Text embeddings and vector similarity.
//!
//! Articles and chat queries are embedded into the same vector space so
//! retrieval can rank stored articles against a query. Two implementations
//! are provided: [`HttpEmbedder`] calls an OpenAI-compatible `/embeddings`
//! endpoint, and [`HashEmbedder`] produces deterministic hashed
//! bag-of-words vectors with no network dependency, which is what the
//! tests and offline development run on.

use async_trait::async_trait;
use ndarray::ArrayView1;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{LlmError, TaskError};
use crate::metrics::MetricsCollector;

/// Dimension of hashed bag-of-words vectors.
pub const DEFAULT_DIMENSION: usize = 384;

/// Turns text into a fixed-dimension vector.
///
/// Implementations must be stable: the same text always maps to the same
/// vector, and all vectors from one embedder share a dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text. Fails with `InvalidInput` on empty input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, TaskError>;

    /// Dimension of the produced vectors.
    fn dimension(&self) -> usize;
}

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Returns `0.0` for empty or mismatched-length inputs so callers can
/// rank without separate length checks.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        a.dot(&b) / denom
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    api_base: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    http_client: Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingApiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl HttpEmbedder {
    /// Creates an embedder with explicit configuration.
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            model: model.into(),
            dimension: 1536,
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Overrides the advertised vector dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Creates an embedder from environment variables.
    ///
    /// Reads `EMBEDDING_API_BASE` (falling back to `LLM_API_BASE`),
    /// `EMBEDDING_API_KEY` (falling back to `LLM_API_KEY`) and
    /// `EMBEDDING_MODEL` (defaults to "text-embedding-3-small").
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("EMBEDDING_API_BASE")
            .or_else(|_| env::var("LLM_API_BASE"))
            .map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("EMBEDDING_API_KEY")
            .ok()
            .or_else(|| env::var("LLM_API_KEY").ok());
        let model =
            env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string());

        Ok(Self::new(api_base, api_key, model))
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the embedding model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{}/embeddings", self.api_base);
        let api_request = EmbeddingApiRequest {
            model: &self.model,
            input: text,
        };

        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request.json(&api_request).send().await?;
        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            if status_code == 429 {
                return Err(LlmError::RateLimited);
            }
            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                return Err(LlmError::ApiError {
                    status: status_code,
                    message: error_response.error.message,
                });
            }
            return Err(LlmError::ApiError {
                status: status_code,
                message: error_text,
            });
        }

        let api_response: EmbeddingApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse embeddings response: {}", e)))?;

        api_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::ParseError("No embedding in response".to_string()))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, TaskError> {
        if text.trim().is_empty() {
            return Err(TaskError::InvalidInput("cannot embed empty text".to_string()));
        }

        let started = Instant::now();
        let result = self.request(text).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(LlmError::RateLimited) => "rate_limited",
            Err(LlmError::ApiError { .. }) => "api_error",
            Err(LlmError::ParseError(_)) => "parse_error",
            Err(_) => "transport_error",
        };
        MetricsCollector::record_llm_request("embeddings", &self.model, outcome, started.elapsed());

        let vector = result.map_err(TaskError::from)?;
        debug!(model = %self.model, dimension = vector.len(), "Embedded text");
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic hashed bag-of-words embedder.
///
/// Each lowercased token is hashed into a bucket with a sign, producing a
/// unit-normalized sparse vector. Similarity is crude but monotone in
/// token overlap, which is all the offline path needs.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Creates an embedder with the default dimension.
    pub fn new() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }

    /// Creates an embedder with a custom dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimension;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, TaskError> {
        if text.trim().is_empty() {
            return Err(TaskError::InvalidInput("cannot embed empty text".to_string()));
        }
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        let c = [-1.0, 0.0, 0.0];

        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &b)).abs() < 1e-6);
        assert!((cosine_similarity(&a, &c) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("Election results announced").await.unwrap();
        let b = embedder.embed("Election results announced").await.unwrap();
        let c = embedder.embed("Rain expected this weekend").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), DEFAULT_DIMENSION);
    }

    #[tokio::test]
    async fn test_hash_embedder_produces_unit_vectors() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("the quick brown fox").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_embedder_similarity_tracks_token_overlap() {
        let embedder = HashEmbedder::new();
        let a = embedder
            .embed("election results government vote")
            .await
            .unwrap();
        let b = embedder
            .embed("election results government policy")
            .await
            .unwrap();
        let c = embedder.embed("banana smoothie recipe butter").await.unwrap();

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[tokio::test]
    async fn test_hash_embedder_rejects_empty_text() {
        let embedder = HashEmbedder::new();
        let err = embedder.embed("   ").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_hash_embedder_custom_dimension() {
        let embedder = HashEmbedder::with_dimension(16);
        let v = embedder.embed("short text").await.unwrap();
        assert_eq!(v.len(), 16);
        assert_eq!(embedder.dimension(), 16);
    }

    #[test]
    fn test_http_embedder_construction() {
        let embedder = HttpEmbedder::new(
            "http://localhost:4000",
            Some("test-key".to_string()),
            "text-embedding-3-small",
        )
        .with_dimension(256);

        assert_eq!(embedder.api_base(), "http://localhost:4000");
        assert_eq!(embedder.model(), "text-embedding-3-small");
        assert_eq!(embedder.dimension(), 256);
    }

    #[tokio::test]
    async fn test_http_embedder_connection_error_is_retryable() {
        // Port that's unlikely to have a server
        let embedder = HttpEmbedder::new("http://localhost:65535", None, "test-model");
        let err = embedder.embed("some text").await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.kind(), "unavailable");
    }
}
