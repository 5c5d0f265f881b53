//! Pipeline orchestration: cache lookup, prompt assembly, the LLM call,
//! response parsing, and memoization of the finished summary.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::cache::SummaryCache;
use crate::config::EngineSettings;
use crate::error::{Result, SummaryError};
use crate::llm::types::LlmOptions;
use crate::llm::{LlmClient, UsageStats};
use crate::models::{
    Message, SummarizationContext, SummaryMetadata, SummaryOptions, SummaryResult,
};
use crate::optimizer::CostEstimate;
use crate::parser::ResponseParser;
use crate::prompt::PromptBuilder;

const TRUNCATION_PRESERVE_RATIO: f64 = 0.8;

/// One unit of work for [`SummarizationEngine::batch_summarize`].
#[derive(Debug, Clone)]
pub struct SummarizeRequest {
    pub messages: Vec<Message>,
    pub options: SummaryOptions,
    pub context: Option<SummarizationContext>,
    pub channel_id: String,
    pub guild_id: String,
}

/// Aggregate health of the engine and its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// The LLM is reachable but the cache is not; pipelines succeed without
    /// memoization.
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub llm_api: bool,
    /// `None` when no cache is configured.
    pub cache: Option<bool>,
    pub usage: UsageStats,
}

/// The summarization engine. Drives message batches through prompt
/// building, the LLM client, and response parsing, memoizing results by
/// channel, hour-truncated time range, and options fingerprint.
pub struct SummarizationEngine {
    llm_client: Arc<LlmClient>,
    cache: Option<Arc<SummaryCache>>,
    prompt_builder: PromptBuilder,
    response_parser: ResponseParser,
    max_prompt_tokens: usize,
    batch_semaphore: Arc<Semaphore>,
}

impl SummarizationEngine {
    pub fn new(
        llm_client: Arc<LlmClient>,
        cache: Option<Arc<SummaryCache>>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            llm_client,
            cache,
            prompt_builder: PromptBuilder::new(),
            response_parser: ResponseParser::new(),
            max_prompt_tokens: settings.max_prompt_tokens,
            batch_semaphore: Arc::new(Semaphore::new(settings.batch_concurrency.max(1))),
        }
    }

    /// Summarize one message batch.
    ///
    /// Messages are expected to be pre-filtered (see the optimizer); the
    /// count check, the derived time window, and the recorded
    /// `message_count` all refer to the batch as given.
    pub async fn summarize(
        &self,
        messages: &[Message],
        options: &SummaryOptions,
        context: Option<&SummarizationContext>,
        channel_id: &str,
        guild_id: &str,
    ) -> Result<SummaryResult> {
        let started = Instant::now();

        options.validate()?;
        if messages.len() < options.min_messages {
            return Err(SummaryError::InsufficientContent {
                found: messages.len(),
                required: options.min_messages,
            });
        }

        // min_messages >= 1 guarantees the window exists.
        let start_time = messages.iter().map(|m| m.timestamp).min().expect("non-empty");
        let end_time = messages.iter().map(|m| m.timestamp).max().expect("non-empty");
        let fingerprint = options.fingerprint();

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache
                .get_cached_summary(channel_id, start_time, end_time, &fingerprint)
                .await
            {
                tracing::info!(channel_id, %fingerprint, "returning cached summary");
                return Ok(hit);
            }
        }

        let prompt = self
            .prompt_builder
            .build(messages, options, context, None);

        let mut user_prompt = prompt.user_prompt;
        if prompt.estimated_tokens > self.max_prompt_tokens {
            let system_tokens = self
                .prompt_builder
                .estimate_token_count(&prompt.system_prompt);
            let user_budget = self.max_prompt_tokens.saturating_sub(system_tokens);
            user_prompt = self.prompt_builder.optimize_prompt_length(
                &user_prompt,
                user_budget,
                TRUNCATION_PRESERVE_RATIO,
            );

            let total = system_tokens + self.prompt_builder.estimate_token_count(&user_prompt);
            if total > self.max_prompt_tokens {
                return Err(SummaryError::PromptTooLong {
                    tokens: prompt.estimated_tokens,
                    max_tokens: self.max_prompt_tokens,
                });
            }
            tracing::debug!(
                original_tokens = prompt.estimated_tokens,
                optimized_tokens = total,
                "prompt truncated to fit the token ceiling"
            );
        }

        let llm_options = LlmOptions {
            model: options.model.clone(),
            max_tokens: options.output_token_budget(),
            temperature: options.temperature,
            ..Default::default()
        };

        let response = self
            .llm_client
            .create_summary(&user_prompt, &prompt.system_prompt, &llm_options)
            .await?;

        let parsed = self.response_parser.parse_summary_response(
            &response.content,
            messages,
            options.include_attachments,
        )?;

        let mut summary = self.response_parser.extract_summary_result(
            parsed,
            channel_id,
            guild_id,
            start_time,
            end_time,
            messages.len(),
            context.cloned(),
        );

        summary.metadata = SummaryMetadata {
            model: Some(response.model.clone()),
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            total_tokens: response.total_tokens(),
            response_id: Some(response.response_id.clone()),
            processing_time_seconds: started.elapsed().as_secs_f64(),
            parsing: summary.metadata.parsing.clone(),
            incomplete: !response.is_complete(),
            error: false,
            error_code: None,
        };

        if let Some(cache) = &self.cache {
            // Cache write failures are logged inside and never surfaced.
            cache.cache_summary(&summary, &fingerprint).await;
        }

        tracing::info!(
            channel_id,
            message_count = summary.message_count,
            input_tokens = summary.metadata.input_tokens,
            output_tokens = summary.metadata.output_tokens,
            "summary produced"
        );

        Ok(summary)
    }

    /// Summarize several batches with bounded parallelism.
    ///
    /// Output order matches input order regardless of completion order.
    /// Individual failures become synthesized error entries with
    /// `metadata.error` set, so partial success stays observable.
    pub async fn batch_summarize(&self, requests: Vec<SummarizeRequest>) -> Vec<SummaryResult> {
        let tasks = requests.into_iter().map(|request| {
            let semaphore = self.batch_semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let outcome = self
                    .summarize(
                        &request.messages,
                        &request.options,
                        request.context.as_ref(),
                        &request.channel_id,
                        &request.guild_id,
                    )
                    .await;
                (request, outcome)
            }
        });

        join_all(tasks)
            .await
            .into_iter()
            .map(|(request, outcome)| match outcome {
                Ok(summary) => summary,
                Err(err) => {
                    tracing::warn!(
                        channel_id = %request.channel_id,
                        code = %err.code(),
                        "batch entry failed, synthesizing error result"
                    );
                    error_result(&request, &err)
                }
            })
            .collect()
    }

    /// Static cost estimate for a batch; never performs network I/O.
    pub fn estimate_cost(&self, messages: &[Message], options: &SummaryOptions) -> CostEstimate {
        let prompt = self.prompt_builder.build(messages, options, None, None);
        let input_tokens = prompt.estimated_tokens;
        let output_tokens = options.output_token_budget() as usize;
        let cost =
            self.llm_client
                .estimate_cost(input_tokens as u32, output_tokens as u32, &options.model);

        CostEstimate {
            estimated_cost_usd: cost,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            model: options.model.clone(),
            message_count: messages.len(),
        }
    }

    /// Probe the LLM API and the cache backend.
    pub async fn health_check(&self) -> HealthReport {
        let llm_api = self.llm_client.health_check().await;
        let cache = match &self.cache {
            Some(cache) => Some(cache.health_check().await),
            None => None,
        };

        let status = if !llm_api {
            HealthStatus::Unhealthy
        } else if cache == Some(false) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            llm_api,
            cache,
            usage: self.llm_client.usage_stats(),
        }
    }
}

/// Synthesized stand-in for a failed batch entry.
fn error_result(request: &SummarizeRequest, err: &SummaryError) -> SummaryResult {
    let now = chrono::Utc::now();
    let start_time = request
        .messages
        .iter()
        .map(|m| m.timestamp)
        .min()
        .unwrap_or(now);
    let end_time = request
        .messages
        .iter()
        .map(|m| m.timestamp)
        .max()
        .unwrap_or(now);

    SummaryResult {
        id: uuid::Uuid::new_v4(),
        channel_id: request.channel_id.clone(),
        guild_id: request.guild_id.clone(),
        start_time,
        end_time,
        message_count: request.messages.len(),
        summary_text: format!("Error: {}", err.user_message()),
        key_points: Vec::new(),
        action_items: Vec::new(),
        technical_terms: Vec::new(),
        participants: Vec::new(),
        metadata: SummaryMetadata {
            error: true,
            error_code: Some(err.code().as_str().to_string()),
            ..Default::default()
        },
        created_at: now,
        context: request.context.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, MemoryCache};
    use crate::error::ErrorCode;
    use crate::llm::transport::{Transport, API_NAME};
    use crate::llm::types::ApiRequest;
    use crate::llm::LlmResponse;
    use crate::models::Priority;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const GOOD_JSON: &str = r#"{
        "summary_text": "Ten test messages discussed X.",
        "key_points": ["shipping decision made", "rollback plan agreed", "dashboard work queued"],
        "action_items": [{"description": "write the runbook", "assignee": "alice", "priority": "high"}],
        "technical_terms": [],
        "participants": []
    }"#;

    fn ok_response(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.into(),
            model: "claude-3-sonnet-20240229".into(),
            input_tokens: 900,
            output_tokens: 180,
            stop_reason: "end_turn".into(),
            response_id: "msg_e2e".into(),
            created_at: Utc::now(),
        }
    }

    struct ScriptedTransport {
        script: Mutex<Vec<crate::error::Result<LlmResponse>>>,
        calls: AtomicUsize,
        fallback: Option<String>,
    }

    impl ScriptedTransport {
        fn new(mut script: Vec<crate::error::Result<LlmResponse>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                fallback: Some(GOOD_JSON.to_string()),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, _request: &ApiRequest) -> crate::error::Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(next) = self.script.lock().unwrap().pop() {
                return next;
            }
            match &self.fallback {
                Some(content) => Ok(ok_response(content)),
                None => panic!("transport called with an empty script"),
            }
        }
    }

    struct EngineHarness {
        engine: SummarizationEngine,
        transport_calls: Arc<ScriptedTransport>,
        backend: Arc<MemoryCache>,
    }

    fn harness_with(
        script: Vec<crate::error::Result<LlmResponse>>,
        settings: EngineSettings,
        with_cache: bool,
    ) -> EngineHarness {
        let transport = Arc::new(ScriptedTransport::new(script));

        struct Shared(Arc<ScriptedTransport>);
        #[async_trait]
        impl Transport for Shared {
            async fn execute(&self, request: &ApiRequest) -> crate::error::Result<LlmResponse> {
                self.0.execute(request).await
            }
        }

        let client = Arc::new(LlmClient::with_transport(
            Box::new(Shared(transport.clone())),
            0,
            Duration::ZERO,
        ));
        let backend = Arc::new(MemoryCache::new(100, 3600).unwrap());
        let cache = with_cache.then(|| Arc::new(SummaryCache::new(backend.clone(), 3600)));

        EngineHarness {
            engine: SummarizationEngine::new(client, cache, &settings),
            transport_calls: transport,
            backend,
        }
    }

    fn harness(script: Vec<crate::error::Result<LlmResponse>>) -> EngineHarness {
        harness_with(script, EngineSettings::default(), true)
    }

    fn messages(count: usize) -> Vec<Message> {
        (0..count)
            .map(|i| Message {
                id: i.to_string(),
                author_name: if i % 3 == 0 { "alice" } else { "bob" }.into(),
                author_id: format!("u{}", i % 3),
                content: format!("message {i} about the feature rollout"),
                timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 9, 10 + i as u32 % 40, 0).unwrap(),
                attachments: vec![],
                code_blocks: vec![],
                thread: None,
                is_bot: false,
            })
            .collect()
    }

    #[tokio::test]
    async fn trivial_success_end_to_end() {
        let h = harness(vec![]);
        let batch = messages(10);

        let summary = h
            .engine
            .summarize(&batch, &SummaryOptions::default(), None, "c1", "g1")
            .await
            .unwrap();

        assert_eq!(summary.message_count, 10);
        assert_eq!(summary.summary_text, "Ten test messages discussed X.");
        assert_eq!(summary.action_items[0].priority, Priority::High);
        assert_eq!(
            summary.metadata.model.as_deref(),
            Some("claude-3-sonnet-20240229")
        );
        assert_eq!(summary.metadata.input_tokens, 900);
        assert_eq!(summary.metadata.output_tokens, 180);
        assert_eq!(summary.metadata.total_tokens, 1080);
        assert!(summary.start_time <= summary.end_time);

        // One LLM call, and the result landed in the cache.
        assert_eq!(h.transport_calls.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.backend.stats().size, 1);
    }

    #[tokio::test]
    async fn second_identical_call_is_a_cache_hit() {
        let h = harness(vec![]);
        let batch = messages(10);
        let options = SummaryOptions::default();

        let first = h
            .engine
            .summarize(&batch, &options, None, "c1", "g1")
            .await
            .unwrap();
        let second = h
            .engine
            .summarize(&batch, &options, None, "c1", "g1")
            .await
            .unwrap();

        assert_eq!(first.id, second.id, "cache returned the same record");
        assert_eq!(
            h.transport_calls.calls.load(Ordering::SeqCst),
            1,
            "no second LLM call"
        );
    }

    #[tokio::test]
    async fn fingerprint_change_misses_the_cache() {
        let h = harness(vec![]);
        let batch = messages(10);

        let options = SummaryOptions::default();
        h.engine
            .summarize(&batch, &options, None, "c1", "g1")
            .await
            .unwrap();

        let mut warmer = options.clone();
        warmer.temperature = 0.9;
        h.engine
            .summarize(&batch, &warmer, None, "c1", "g1")
            .await
            .unwrap();

        assert_eq!(h.transport_calls.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.backend.stats().size, 2);
    }

    #[tokio::test]
    async fn insufficient_content_makes_no_llm_call_and_no_cache_write() {
        let h = harness(vec![]);
        let batch = messages(4);
        let options = SummaryOptions {
            min_messages: 5,
            ..Default::default()
        };

        let err = h
            .engine
            .summarize(&batch, &options, None, "c1", "g1")
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::InsufficientContent);
        assert_eq!(h.transport_calls.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.backend.stats().size, 0);
    }

    #[tokio::test]
    async fn exactly_min_messages_proceeds() {
        let h = harness(vec![]);
        let batch = messages(5);
        let options = SummaryOptions {
            min_messages: 5,
            ..Default::default()
        };
        assert!(h
            .engine
            .summarize(&batch, &options, None, "c1", "g1")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn oversized_prompt_fails_without_llm_call() {
        let settings = EngineSettings {
            max_prompt_tokens: 50,
            batch_concurrency: 3,
        };
        let h = harness_with(vec![], settings, true);

        let mut batch = messages(5);
        for message in &mut batch {
            message.content = "long content ".repeat(500);
        }

        let err = h
            .engine
            .summarize(&batch, &SummaryOptions::default(), None, "c1", "g1")
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::PromptTooLong);
        assert_eq!(h.transport_calls.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.backend.stats().size, 0);
    }

    #[tokio::test]
    async fn truncatable_prompt_is_optimized_and_proceeds() {
        // Large enough for the framing, too small for 40 padded messages.
        let settings = EngineSettings {
            max_prompt_tokens: 2000,
            batch_concurrency: 3,
        };
        let h = harness_with(vec![], settings, true);

        let mut batch = messages(40);
        for message in &mut batch {
            message.content = "padding words ".repeat(40);
        }

        let summary = h
            .engine
            .summarize(&batch, &SummaryOptions::default(), None, "c1", "g1")
            .await
            .unwrap();
        assert_eq!(summary.message_count, 40);
        assert_eq!(h.transport_calls.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn llm_errors_propagate_unchanged() {
        let h = harness(vec![Err(SummaryError::AuthenticationFailed {
            api: API_NAME,
            details: "expired".into(),
        })]);

        let err = h
            .engine
            .summarize(&messages(10), &SummaryOptions::default(), None, "c1", "g1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn unparseable_response_maps_to_parse_failed() {
        let h = harness(vec![Ok(ok_response("   "))]);
        let err = h
            .engine
            .summarize(&messages(10), &SummaryOptions::default(), None, "c1", "g1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResponseParseFailed);
    }

    #[tokio::test]
    async fn truncated_llm_output_is_flagged_incomplete() {
        let mut cut = ok_response(GOOD_JSON);
        cut.stop_reason = "max_tokens".into();
        let h = harness(vec![Ok(cut)]);

        let summary = h
            .engine
            .summarize(&messages(10), &SummaryOptions::default(), None, "c1", "g1")
            .await
            .unwrap();
        assert!(summary.metadata.incomplete);
    }

    #[tokio::test]
    async fn batch_preserves_input_order_and_observes_partial_failure() {
        let h = harness(vec![]);

        let make = |channel: &str, count: usize| SummarizeRequest {
            messages: messages(count),
            options: SummaryOptions::default(),
            context: None,
            channel_id: channel.into(),
            guild_id: "g1".into(),
        };

        // The middle request fails its minimum-count check.
        let results = h
            .engine
            .batch_summarize(vec![make("c1", 10), make("c2", 2), make("c3", 10)])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].channel_id, "c1");
        assert_eq!(results[1].channel_id, "c2");
        assert_eq!(results[2].channel_id, "c3");

        assert!(!results[0].metadata.error);
        assert!(results[1].metadata.error);
        assert_eq!(
            results[1].metadata.error_code.as_deref(),
            Some("INSUFFICIENT_CONTENT")
        );
        assert!(results[1].summary_text.starts_with("Error:"));
        assert!(!results[2].metadata.error);
    }

    #[tokio::test]
    async fn batch_runs_under_the_concurrency_bound() {
        let settings = EngineSettings {
            max_prompt_tokens: 100_000,
            batch_concurrency: 3,
        };
        let h = harness_with(vec![], settings, false);

        let requests: Vec<SummarizeRequest> = (0..8)
            .map(|i| SummarizeRequest {
                messages: messages(10),
                options: SummaryOptions::default(),
                context: None,
                channel_id: format!("c{i}"),
                guild_id: "g1".into(),
            })
            .collect();

        let results = h.engine.batch_summarize(requests).await;
        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.channel_id, format!("c{i}"));
        }
        assert_eq!(h.transport_calls.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn cost_estimate_makes_no_network_call() {
        let h = harness(vec![]);
        let estimate = h
            .engine
            .estimate_cost(&messages(10), &SummaryOptions::default());

        assert_eq!(estimate.message_count, 10);
        assert_eq!(estimate.output_tokens, 4000);
        assert!(estimate.estimated_cost_usd > 0.0);
        assert_eq!(h.transport_calls.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn health_is_healthy_when_everything_answers() {
        let h = harness(vec![]);
        let report = h.engine.health_check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.llm_api);
        assert_eq!(report.cache, Some(true));
    }

    #[tokio::test]
    async fn health_is_unhealthy_when_llm_is_down() {
        let h = harness(vec![Err(SummaryError::NetworkError {
            api: API_NAME,
            details: "down".into(),
        })]);
        let report = h.engine.health_check().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!report.llm_api);
    }

    #[tokio::test]
    async fn health_degrades_when_cache_is_down() {
        struct DeadBackend;
        #[async_trait]
        impl CacheBackend for DeadBackend {
            async fn get(&self, _key: &str) -> Option<serde_json::Value> {
                None
            }
            async fn set(&self, _key: &str, _value: serde_json::Value, _ttl: i64) -> bool {
                false
            }
            async fn delete(&self, _key: &str) -> bool {
                false
            }
            async fn clear(&self, _prefix: Option<&str>) -> usize {
                0
            }
            async fn health_check(&self) -> bool {
                false
            }
        }

        let transport = Arc::new(ScriptedTransport::new(vec![]));
        struct Shared(Arc<ScriptedTransport>);
        #[async_trait]
        impl Transport for Shared {
            async fn execute(&self, request: &ApiRequest) -> crate::error::Result<LlmResponse> {
                self.0.execute(request).await
            }
        }
        let client = Arc::new(LlmClient::with_transport(
            Box::new(Shared(transport)),
            0,
            Duration::ZERO,
        ));
        let cache = Arc::new(SummaryCache::new(Arc::new(DeadBackend), 3600));
        let engine =
            SummarizationEngine::new(client, Some(cache), &EngineSettings::default());

        let report = engine.health_check().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.llm_api);
        assert_eq!(report.cache, Some(false));
    }
}
