//! Request options, response values, usage counters, and the wire types
//! spoken with the external completion API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Options for a single completion request.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stop_sequences: Vec<String>,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            model: "claude-3-sonnet-20240229".to_string(),
            max_tokens: 4000,
            temperature: 0.3,
            top_p: None,
            top_k: None,
            stop_sequences: Vec::new(),
        }
    }
}

/// A whole completion response; streaming is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub stop_reason: String,
    pub response_id: String,
    pub created_at: DateTime<Utc>,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// False when the model stopped at the output cap, i.e. the text may be
    /// cut off mid-thought.
    pub fn is_complete(&self) -> bool {
        self.stop_reason != "max_tokens"
    }
}

/// Monotonic per-client usage counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    pub errors_count: u64,
    pub rate_limit_hits: u64,
    pub last_request_time: Option<DateTime<Utc>>,
}

impl UsageStats {
    /// Record a successful request and its computed cost.
    pub fn add_request(&mut self, response: &LlmResponse, cost: f64) {
        self.total_requests += 1;
        self.total_input_tokens += u64::from(response.input_tokens);
        self.total_output_tokens += u64::from(response.output_tokens);
        self.total_cost_usd += cost;
        self.last_request_time = Some(Utc::now());
    }

    /// Record a failed attempt.
    pub fn add_error(&mut self, is_rate_limit: bool) {
        self.errors_count += 1;
        if is_rate_limit {
            self.rate_limit_hits += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ApiMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    pub content: Vec<ApiContentBlock>,
    pub usage: ApiUsage,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiContentBlock {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(stop_reason: &str) -> LlmResponse {
        LlmResponse {
            content: "summary".into(),
            model: "claude-3-sonnet-20240229".into(),
            input_tokens: 800,
            output_tokens: 150,
            stop_reason: stop_reason.into(),
            response_id: "msg_01".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn completeness_tracks_stop_reason() {
        assert!(response("end_turn").is_complete());
        assert!(!response("max_tokens").is_complete());
        assert_eq!(response("end_turn").total_tokens(), 950);
    }

    #[test]
    fn usage_stats_accumulate_exact_token_counts() {
        let mut stats = UsageStats::default();
        stats.add_request(&response("end_turn"), 0.005);
        stats.add_request(&response("end_turn"), 0.005);

        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_input_tokens, 1600);
        assert_eq!(stats.total_output_tokens, 300);
        assert!((stats.total_cost_usd - 0.01).abs() < 1e-9);
        assert!(stats.last_request_time.is_some());
    }

    #[test]
    fn errors_and_rate_limits_count_separately() {
        let mut stats = UsageStats::default();
        stats.add_error(false);
        stats.add_error(true);
        assert_eq!(stats.errors_count, 2);
        assert_eq!(stats.rate_limit_hits, 1);
    }

    #[test]
    fn request_serializes_optional_fields_sparsely() {
        let request = ApiRequest {
            model: "claude-3-sonnet-20240229".into(),
            max_tokens: 1000,
            temperature: 0.3,
            system: "be brief".into(),
            messages: vec![ApiMessage {
                role: "user",
                content: "hello".into(),
            }],
            top_p: None,
            top_k: None,
            stop_sequences: Vec::new(),
            stream: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("top_p").is_none());
        assert!(value.get("stop_sequences").is_none());
        assert!(value.get("stream").is_none());
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
