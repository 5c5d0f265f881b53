//! Error taxonomy for the summarization core.
//!
//! Every failure surfaced across the crate boundary is a [`SummaryError`]
//! variant carrying a stable [`ErrorCode`], a retryability flag, and a
//! human-readable message safe to show end users. Cache failures are never
//! represented here — a cache read failure is a miss, a cache write failure
//! is logged and discarded.

use thiserror::Error;

/// Stable machine-readable error codes surfaced across the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InsufficientContent,
    InvalidOptions,
    ModelUnavailable,
    ContextLengthExceeded,
    RateLimit,
    NetworkError,
    ApiTimeout,
    ServiceUnavailable,
    AuthenticationFailed,
    PromptTooLong,
    TokenLimitExceeded,
    ResponseParseFailed,
    InvalidResponse,
    BadRequest,
    SummarizationFailed,
}

impl ErrorCode {
    /// The wire identifier, e.g. `RATE_LIMIT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InsufficientContent => "INSUFFICIENT_CONTENT",
            ErrorCode::InvalidOptions => "INVALID_OPTIONS",
            ErrorCode::ModelUnavailable => "MODEL_UNAVAILABLE",
            ErrorCode::ContextLengthExceeded => "CONTEXT_LENGTH_EXCEEDED",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ApiTimeout => "API_TIMEOUT",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorCode::PromptTooLong => "PROMPT_TOO_LONG",
            ErrorCode::TokenLimitExceeded => "TOKEN_LIMIT_EXCEEDED",
            ErrorCode::ResponseParseFailed => "RESPONSE_PARSE_FAILED",
            ErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::SummarizationFailed => "SUMMARIZATION_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed error type for the summarization core.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("insufficient content: {found} messages (minimum {required} required)")]
    InsufficientContent { found: usize, required: usize },

    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },

    #[error("model '{model}' is not in the model registry")]
    ModelUnavailable { model: String },

    #[error("prompt exceeds the model's maximum context length")]
    ContextLengthExceeded,

    #[error("{api} rate limit exceeded")]
    RateLimit {
        api: &'static str,
        /// Suggested backoff in seconds, parsed from the remote error when present.
        retry_after: Option<u64>,
    },

    #[error("network error talking to {api}: {details}")]
    NetworkError { api: &'static str, details: String },

    #[error("{api} request timed out after {timeout_secs} seconds")]
    Timeout { api: &'static str, timeout_secs: u64 },

    #[error("{api} service unavailable (status {status})")]
    ServiceUnavailable { api: &'static str, status: u16 },

    #[error("{api} authentication failed: {details}")]
    AuthenticationFailed { api: &'static str, details: String },

    #[error("prompt too long: {tokens} tokens (max {max_tokens})")]
    PromptTooLong { tokens: usize, max_tokens: usize },

    #[error("response exceeded the output token limit")]
    TokenLimitExceeded,

    #[error("failed to parse LLM response with any available parser")]
    ResponseParseFailed { warnings: Vec<String> },

    #[error("invalid response from {api}: expected {expected}, got {received}")]
    InvalidResponse {
        api: &'static str,
        expected: String,
        received: String,
    },

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("summarization failed: {message}")]
    SummarizationFailed {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SummaryError {
    /// Stable code for the wire boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            SummaryError::InsufficientContent { .. } => ErrorCode::InsufficientContent,
            SummaryError::InvalidOptions { .. } => ErrorCode::InvalidOptions,
            SummaryError::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            SummaryError::ContextLengthExceeded => ErrorCode::ContextLengthExceeded,
            SummaryError::RateLimit { .. } => ErrorCode::RateLimit,
            SummaryError::NetworkError { .. } => ErrorCode::NetworkError,
            SummaryError::Timeout { .. } => ErrorCode::ApiTimeout,
            SummaryError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            SummaryError::AuthenticationFailed { .. } => ErrorCode::AuthenticationFailed,
            SummaryError::PromptTooLong { .. } => ErrorCode::PromptTooLong,
            SummaryError::TokenLimitExceeded => ErrorCode::TokenLimitExceeded,
            SummaryError::ResponseParseFailed { .. } => ErrorCode::ResponseParseFailed,
            SummaryError::InvalidResponse { .. } => ErrorCode::InvalidResponse,
            SummaryError::BadRequest { .. } => ErrorCode::BadRequest,
            SummaryError::SummarizationFailed { .. } => ErrorCode::SummarizationFailed,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            SummaryError::RateLimit { .. }
                | SummaryError::NetworkError { .. }
                | SummaryError::Timeout { .. }
                | SummaryError::ServiceUnavailable { .. }
                | SummaryError::SummarizationFailed { .. }
        )
    }

    /// Suggested backoff in seconds, when the error carries one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            SummaryError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Human-readable message safe to display to end users.
    pub fn user_message(&self) -> String {
        match self {
            SummaryError::InsufficientContent { found, required } => format!(
                "Not enough messages to summarize. Found {found}, but at least {required} are required for a meaningful summary."
            ),
            SummaryError::InvalidOptions { reason } => {
                format!("Invalid summarization options: {reason}.")
            }
            SummaryError::ModelUnavailable { model } => {
                format!("The requested AI model ({model}) is not available.")
            }
            SummaryError::ContextLengthExceeded | SummaryError::PromptTooLong { .. } => {
                "The content is too long to summarize in one request. Try a shorter time period or fewer messages.".to_string()
            }
            SummaryError::RateLimit { api, retry_after } => match retry_after {
                Some(secs) => format!(
                    "Rate limit reached for {api}. Please wait {secs} seconds and try again."
                ),
                None => format!("Rate limit reached for {api}. Please wait a moment and try again."),
            },
            SummaryError::NetworkError { api, .. } => {
                format!("Network connectivity issue with {api}. Please try again in a moment.")
            }
            SummaryError::Timeout { api, .. } => {
                format!("Request to {api} timed out. Please try again.")
            }
            SummaryError::ServiceUnavailable { api, .. } => {
                format!("{api} is temporarily unavailable. Please try again later.")
            }
            SummaryError::AuthenticationFailed { .. } => {
                "Service authentication failed. Please contact support.".to_string()
            }
            SummaryError::TokenLimitExceeded => {
                "The summary was too long to generate completely. Try requesting a shorter summary.".to_string()
            }
            SummaryError::ResponseParseFailed { .. } => {
                "The AI response could not be understood. Please try again.".to_string()
            }
            SummaryError::InvalidResponse { api, .. } => {
                format!("{api} returned an unexpected response. Please try again.")
            }
            SummaryError::BadRequest { .. } => {
                "The summarization request was rejected. Please adjust the options and try again.".to_string()
            }
            SummaryError::SummarizationFailed { .. } => {
                "Summarization failed. Please try again or contact support if the problem persists.".to_string()
            }
        }
    }

    /// Wrap an arbitrary failure from a sub-component. Errors already in the
    /// taxonomy pass through unchanged.
    pub fn wrap(err: impl Into<Box<dyn std::error::Error + Send + Sync>>, stage: &str) -> Self {
        let boxed = err.into();
        match boxed.downcast::<SummaryError>() {
            Ok(own) => *own,
            Err(other) => SummaryError::SummarizationFailed {
                message: format!("{stage}: {other}"),
                cause: Some(other),
            },
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SummaryError>;
