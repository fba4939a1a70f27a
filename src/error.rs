//! Shared error types used across the crate.
//!
//! Task bodies, collaborator traits, and the conversation graph all fail
//! with [`TaskError`], which is the error taxonomy the worker pool's retry
//! logic classifies. Subsystems with richer failure detail (queue, pool,
//! config, LLM transport) define their own error enums and convert into
//! `TaskError` where they cross the task boundary.

use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy for task bodies and collaborator calls.
///
/// The distinction between retryable and non-retryable kinds drives the
/// retry policy: `Unavailable` and `Timeout` are transient and worth
/// another attempt, `InvalidInput` is permanent and abandons the job on
/// the first failure.
#[derive(Debug, Error)]
pub enum TaskError {
    /// An upstream dependency could not be reached or returned a
    /// transient failure. Retryable.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        /// Which dependency failed (e.g. "news feed", "translator").
        service: String,
        /// Human-readable failure detail.
        reason: String,
    },

    /// The operation exceeded its allotted time. Retryable.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The payload or a collaborator argument was malformed. Not
    /// retryable; jobs failing with this kind are abandoned immediately.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The enclosing caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl TaskError {
    /// Builds an `Unavailable` error for a named dependency.
    pub fn unavailable(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout(_))
    }

    /// Short stable label for logs, metrics, and stored job results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::InvalidInput(_) => "invalid_input",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Errors from the LLM chat transport.
#[derive(Debug, Error)]
pub enum LlmError {
    /// API base URL was not provided via config or environment.
    #[error("LLM API base URL not configured")]
    MissingApiBase,

    /// API key was not provided via config or environment.
    #[error("LLM API key not configured")]
    MissingApiKey,

    /// The HTTP request itself failed.
    #[error("LLM request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The response body could not be interpreted.
    #[error("failed to parse LLM response: {0}")]
    ParseError(String),

    /// The provider rejected the request due to rate limiting.
    #[error("LLM rate limit exceeded")]
    RateLimited,

    /// The provider returned a structured API error.
    #[error("LLM API error ({status}): {message}")]
    ApiError {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Error message from the response body.
        message: String,
    },
}

impl From<LlmError> for TaskError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingApiBase | LlmError::MissingApiKey => {
                TaskError::InvalidInput(err.to_string())
            }
            other => TaskError::unavailable("llm", other),
        }
    }
}
