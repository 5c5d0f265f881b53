//! The LLM client: registry gate, request pacing, retry with backoff, and
//! usage accounting. One public operation: `create_summary`.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LlmConfig;
use crate::error::{Result, SummaryError};
use crate::llm::registry;
use crate::llm::transport::{HttpTransport, Transport, API_NAME};
use crate::llm::types::{ApiMessage, ApiRequest, LlmOptions, LlmResponse, UsageStats};

const RATE_LIMIT_DEFAULT_BACKOFF_SECS: u64 = 60;

/// Enforces a minimum interval between outbound requests, process-wide for
/// this client. Advisory pacing, independent of remote rate limits.
struct Pacer {
    last_request: tokio::sync::Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl Pacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: tokio::sync::Mutex::new(None),
            min_interval,
        }
    }

    /// Waits until at least `min_interval` has passed since the previous
    /// caller was released. The lock is held across the sleep so concurrent
    /// callers serialize and each gets its own slot.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Client for the external completion API.
pub struct LlmClient {
    transport: Box<dyn Transport>,
    pacer: Pacer,
    max_retries: u32,
    usage_stats: Mutex<UsageStats>,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.timeout_secs,
        )?;
        Ok(Self::with_transport(
            Box::new(transport),
            config.max_retries,
            Duration::from_millis(config.min_request_interval_ms),
        ))
    }

    pub(crate) fn with_transport(
        transport: Box<dyn Transport>,
        max_retries: u32,
        min_request_interval: Duration,
    ) -> Self {
        Self {
            transport,
            pacer: Pacer::new(min_request_interval),
            max_retries,
            usage_stats: Mutex::new(UsageStats::default()),
        }
    }

    /// Request a summary completion.
    ///
    /// Unknown models fail before any network I/O. Transient failures are
    /// retried up to `max_retries` times with per-class backoff; every
    /// attempt's outcome lands in the usage counters.
    pub async fn create_summary(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &LlmOptions,
    ) -> Result<LlmResponse> {
        if !registry::is_known(&options.model) {
            return Err(SummaryError::ModelUnavailable {
                model: options.model.clone(),
            });
        }

        self.pacer.pace().await;

        let request = ApiRequest {
            model: options.model.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system: system_prompt.to_string(),
            messages: vec![ApiMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            top_p: options.top_p,
            top_k: options.top_k,
            stop_sequences: options.stop_sequences.clone(),
            stream: None,
        };

        let mut attempt: u32 = 0;
        loop {
            match self.transport.execute(&request).await {
                Ok(response) => {
                    let cost = registry::estimate_cost(
                        &response.model,
                        response.input_tokens,
                        response.output_tokens,
                    );
                    {
                        let mut stats = self.usage_stats.lock().expect("usage stats lock poisoned");
                        stats.add_request(&response, cost);
                    }
                    tracing::info!(
                        model = %response.model,
                        input_tokens = response.input_tokens,
                        output_tokens = response.output_tokens,
                        stop_reason = %response.stop_reason,
                        "{API_NAME} request succeeded"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    let is_rate_limit = matches!(err, SummaryError::RateLimit { .. });
                    {
                        let mut stats = self.usage_stats.lock().expect("usage stats lock poisoned");
                        stats.add_error(is_rate_limit);
                    }

                    if !err.retryable() || attempt >= self.max_retries {
                        tracing::error!(code = %err.code(), attempt, "{API_NAME} request failed");
                        return Err(err);
                    }

                    let backoff = match &err {
                        SummaryError::RateLimit { retry_after, .. } => Duration::from_secs(
                            retry_after.unwrap_or(RATE_LIMIT_DEFAULT_BACKOFF_SECS),
                        ),
                        _ => Duration::from_secs(1u64 << attempt.min(6)),
                    };
                    tracing::warn!(
                        code = %err.code(),
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        "{API_NAME} request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Whether the API answers a minimal request.
    pub async fn health_check(&self) -> bool {
        let options = LlmOptions {
            max_tokens: 10,
            ..Default::default()
        };
        self.create_summary("Say hello", "You are a helpful assistant.", &options)
            .await
            .is_ok()
    }

    /// Static cost estimate; no network.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32, model: &str) -> f64 {
        registry::estimate_cost(model, input_tokens, output_tokens)
    }

    /// Snapshot of the usage counters.
    pub fn usage_stats(&self) -> UsageStats {
        self.usage_stats
            .lock()
            .expect("usage stats lock poisoned")
            .clone()
    }
}
