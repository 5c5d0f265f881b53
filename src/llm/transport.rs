//! HTTP transport to the completion API, with the status→error mapping.
//!
//! The transport executes exactly one request per call; pacing and retries
//! live in the client. A trait seam keeps the retry logic testable without
//! a network.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;

use crate::error::{Result, SummaryError};
use crate::llm::types::{ApiErrorResponse, ApiRequest, ApiResponse, LlmResponse};

pub(crate) const API_NAME: &str = "Claude";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Patterns like "retry after 60 seconds" inside remote error messages.
static RETRY_AFTER_IN_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry.+?(\d+).+?second").expect("valid retry-after regex"));

/// One-shot request execution against the completion API.
#[async_trait]
pub(crate) trait Transport: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<LlmResponse>;
}

/// reqwest-backed transport.
pub(crate) struct HttpTransport {
    client: Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

impl HttpTransport {
    pub(crate) fn new(api_key: String, base_url: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(DEFAULT_POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|err| SummaryError::SummarizationFailed {
                message: format!("failed to build HTTP client: {err}"),
                cause: Some(Box::new(err)),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url,
            timeout_secs,
        })
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> SummaryError {
        let status = response.status().as_u16();

        // Retry-After header, in seconds, when the remote provides one.
        let header_retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let message = match response.json::<ApiErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => String::new(),
        };

        match status {
            429 => {
                let retry_after = header_retry_after.or_else(|| extract_retry_after(&message));
                tracing::warn!(?retry_after, "rate limited by {API_NAME}");
                SummaryError::RateLimit {
                    api: API_NAME,
                    retry_after,
                }
            }
            401 | 403 => SummaryError::AuthenticationFailed {
                api: API_NAME,
                details: message,
            },
            400 => {
                if message.to_lowercase().contains("context length") {
                    SummaryError::ContextLengthExceeded
                } else {
                    SummaryError::BadRequest { message }
                }
            }
            503 | 529 => SummaryError::ServiceUnavailable {
                api: API_NAME,
                status,
            },
            _ => SummaryError::SummarizationFailed {
                message: format!("{API_NAME} returned status {status}: {message}"),
                cause: None,
            },
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<LlmResponse> {
        tracing::debug!(model = %request.model, max_tokens = request.max_tokens, "sending completion request");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", self.api_key.trim())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|err| map_send_error(err, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let api_response: ApiResponse =
            response
                .json()
                .await
                .map_err(|err| SummaryError::InvalidResponse {
                    api: API_NAME,
                    expected: "completion JSON body".to_string(),
                    received: err.to_string(),
                })?;

        Ok(into_llm_response(api_response, &request.model))
    }
}

fn map_send_error(err: reqwest::Error, timeout_secs: u64) -> SummaryError {
    if err.is_timeout() {
        SummaryError::Timeout {
            api: API_NAME,
            timeout_secs,
        }
    } else {
        SummaryError::NetworkError {
            api: API_NAME,
            details: err.to_string(),
        }
    }
}

fn into_llm_response(response: ApiResponse, requested_model: &str) -> LlmResponse {
    let content = response
        .content
        .iter()
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("");

    LlmResponse {
        content,
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
        stop_reason: response
            .stop_reason
            .unwrap_or_else(|| "end_turn".to_string()),
        response_id: response.id,
        created_at: chrono::Utc::now(),
    }
}

/// Pull a retry delay out of an error message, e.g. "please retry after 60
/// seconds".
pub(crate) fn extract_retry_after(message: &str) -> Option<u64> {
    RETRY_AFTER_IN_MESSAGE
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
