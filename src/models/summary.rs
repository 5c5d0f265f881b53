//! Summary value types: options, context, and the final result record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SummaryError};
use crate::utils::short_digest;

/// Target summary depth. Selects the system-prompt template and the
/// output token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Brief,
    #[default]
    Detailed,
    Comprehensive,
}

impl SummaryLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLength::Brief => "brief",
            SummaryLength::Detailed => "detailed",
            SummaryLength::Comprehensive => "comprehensive",
        }
    }

    /// Output token budget for this depth.
    pub fn output_token_budget(&self) -> u32 {
        match self {
            SummaryLength::Brief => 1000,
            SummaryLength::Detailed => 4000,
            SummaryLength::Comprehensive => 8000,
        }
    }
}

impl std::fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action item priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Case-insensitive coercion; anything unrecognized becomes `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            "critical" => Priority::Critical,
            _ => Priority::Medium,
        }
    }
}

/// A task extracted from the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
}

impl ActionItem {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            assignee: None,
            priority: Priority::default(),
            completed: false,
        }
    }
}

/// A technical term with its in-conversation definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalTerm {
    pub term: String,
    pub definition: String,
    #[serde(default)]
    pub context: String,
}

/// A conversation participant with their contribution summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub display_name: String,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub key_contributions: Vec<String>,
}

/// Options controlling a summarization run.
///
/// The subset of fields that affects what the LLM produces is folded into
/// [`SummaryOptions::fingerprint`], which cache keys embed; cosmetic fields
/// (`min_messages`, `excluded_users`) deliberately do not participate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOptions {
    #[serde(default)]
    pub length: SummaryLength,
    #[serde(default)]
    pub include_bots: bool,
    #[serde(default = "default_include_attachments")]
    pub include_attachments: bool,
    /// User ids whose messages are dropped before summarization.
    #[serde(default)]
    pub excluded_users: BTreeSet<String>,
    /// Summarization fails below this post-filter message count.
    #[serde(default = "default_min_messages")]
    pub min_messages: usize,
    #[serde(default = "default_true")]
    pub extract_action_items: bool,
    #[serde(default = "default_true")]
    pub extract_technical_terms: bool,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Output token cap override; `None` means the length's budget.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_include_attachments() -> bool {
    true
}

fn default_min_messages() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            length: SummaryLength::default(),
            include_bots: false,
            include_attachments: default_include_attachments(),
            excluded_users: BTreeSet::new(),
            min_messages: default_min_messages(),
            extract_action_items: true,
            extract_technical_terms: true,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl SummaryOptions {
    /// Effective output token budget: the override if set, else the
    /// length-derived budget.
    pub fn output_token_budget(&self) -> u32 {
        self.max_tokens.unwrap_or(self.length.output_token_budget())
    }

    /// Stable 8-hex-char digest of every option that affects LLM output.
    ///
    /// Two option sets differing only in non-fingerprint fields share a
    /// cache entry; any change to model, length, temperature, token budget,
    /// or a prompt-affecting flag yields a different digest.
    pub fn fingerprint(&self) -> String {
        let basis = format!(
            "{}:{}:{}:{}:{}:{}:{}:{}",
            self.length,
            self.model,
            self.temperature,
            self.output_token_budget(),
            self.include_bots,
            self.include_attachments,
            self.extract_action_items,
            self.extract_technical_terms,
        );
        short_digest(&basis, 8)
    }

    /// Negative instructions appended to the system prompt.
    pub fn system_prompt_additions(&self) -> Vec<String> {
        let mut additions = Vec::new();
        if !self.extract_action_items {
            additions.push("Do not extract action items; return an empty action_items list.".to_string());
        }
        if !self.extract_technical_terms {
            additions.push("Do not define technical terms; return an empty technical_terms list.".to_string());
        }
        additions
    }

    /// Reject option sets the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.min_messages < 1 {
            return Err(SummaryError::InvalidOptions {
                reason: "min_messages must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) || self.temperature.is_nan() {
            return Err(SummaryError::InvalidOptions {
                reason: format!("temperature {} outside [0, 2]", self.temperature),
            });
        }
        if self.model.trim().is_empty() {
            return Err(SummaryError::InvalidOptions {
                reason: "model must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Descriptive context about the conversation being summarized.
///
/// Consumed only by the prompt builder; never part of cache keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizationContext {
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub guild_name: Option<String>,
    #[serde(default)]
    pub total_participants: Option<usize>,
    #[serde(default)]
    pub time_span_hours: Option<f64>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
}

/// Which parsing strategy produced the structured summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsingMethod {
    Json,
    Markdown,
    Freeform,
}

/// Per-field extraction counts recorded by the parser.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub key_points: usize,
    pub action_items: usize,
    pub technical_terms: usize,
    pub participants: usize,
}

/// Post-validation counts recorded by the parser.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FinalStats {
    pub summary_length: usize,
    pub key_points: usize,
    pub action_items: usize,
    pub technical_terms: usize,
    pub participants: usize,
}

/// Parsing telemetry embedded in summary metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsingMetadata {
    pub response_length: usize,
    #[serde(default)]
    pub parsing_method: Option<ParsingMethod>,
    #[serde(default)]
    pub extraction_stats: Option<ExtractionStats>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub final_stats: Option<FinalStats>,
}

/// LLM and processing metadata attached to a summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryMetadata {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub processing_time_seconds: f64,
    #[serde(default)]
    pub parsing: ParsingMetadata,
    /// Set when the LLM stopped at the output cap; the summary may be cut off.
    #[serde(default)]
    pub incomplete: bool,
    /// Set on synthesized batch error entries.
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub error_code: Option<String>,
}

/// The finished, immutable summary record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    pub id: Uuid,
    pub channel_id: String,
    pub guild_id: String,
    /// Earliest message timestamp in the summarized range.
    pub start_time: DateTime<Utc>,
    /// Latest message timestamp in the summarized range.
    pub end_time: DateTime<Utc>,
    pub message_count: usize,
    pub summary_text: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub technical_terms: Vec<TechnicalTerm>,
    pub participants: Vec<Participant>,
    pub metadata: SummaryMetadata,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub context: Option<SummarizationContext>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn output_budget_follows_length_then_override() {
        let mut opts = SummaryOptions::default();
        opts.length = SummaryLength::Brief;
        assert_eq!(opts.output_token_budget(), 1000);
        opts.length = SummaryLength::Comprehensive;
        assert_eq!(opts.output_token_budget(), 8000);
        opts.max_tokens = Some(2500);
        assert_eq!(opts.output_token_budget(), 2500);
    }

    #[test]
    fn fingerprint_ignores_cosmetic_options() {
        let a = SummaryOptions::default();
        let mut b = a.clone();
        b.min_messages = 50;
        b.excluded_users.insert("u9".into());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_output_affecting_options() {
        let base = SummaryOptions::default();

        let mut other = base.clone();
        other.model = "claude-3-opus-20240229".into();
        assert_ne!(base.fingerprint(), other.fingerprint());

        let mut other = base.clone();
        other.length = SummaryLength::Brief;
        assert_ne!(base.fingerprint(), other.fingerprint());

        let mut other = base.clone();
        other.temperature = 0.7;
        assert_ne!(base.fingerprint(), other.fingerprint());

        let mut other = base.clone();
        other.extract_action_items = false;
        assert_ne!(base.fingerprint(), other.fingerprint());
    }

    #[test]
    fn fingerprint_is_eight_hex_chars() {
        let fp = SummaryOptions::default().fingerprint();
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[rstest::rstest]
    #[case("HIGH", Priority::High)]
    #[case("critical", Priority::Critical)]
    #[case(" low ", Priority::Low)]
    #[case("urgent-ish", Priority::Medium)]
    #[case("", Priority::Medium)]
    fn priority_coercion_defaults_to_medium(#[case] input: &str, #[case] expected: Priority) {
        assert_eq!(Priority::parse_lenient(input), expected);
    }

    #[test]
    fn validate_rejects_bad_ranges() {
        let mut opts = SummaryOptions::default();
        opts.min_messages = 0;
        assert!(opts.validate().is_err());

        let mut opts = SummaryOptions::default();
        opts.temperature = 2.5;
        assert!(opts.validate().is_err());

        assert!(SummaryOptions::default().validate().is_ok());
    }

    #[test]
    fn summary_result_round_trips_through_json() {
        let result = SummaryResult {
            id: Uuid::new_v4(),
            channel_id: "c1".into(),
            guild_id: "g1".into(),
            start_time: Utc.with_ymd_and_hms(2024, 6, 1, 9, 15, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 6, 1, 11, 45, 0).unwrap(),
            message_count: 12,
            summary_text: "The team agreed on the rollout plan.".into(),
            key_points: vec!["Rollout starts Monday".into()],
            action_items: vec![ActionItem {
                description: "Write the runbook".into(),
                assignee: Some("alice".into()),
                priority: Priority::High,
                completed: false,
            }],
            technical_terms: vec![TechnicalTerm {
                term: "canary".into(),
                definition: "partial rollout to a traffic slice".into(),
                context: "deploy discussion".into(),
            }],
            participants: vec![Participant {
                display_name: "alice".into(),
                message_count: 7,
                key_contributions: vec!["proposed the canary".into()],
            }],
            metadata: SummaryMetadata {
                model: Some("claude-3-sonnet-20240229".into()),
                input_tokens: 900,
                output_tokens: 210,
                total_tokens: 1110,
                ..Default::default()
            },
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            context: None,
        };

        let wire = serde_json::to_value(&result).unwrap();
        let back: SummaryResult = serde_json::from_value(wire).unwrap();
        assert_eq!(back.id, result.id);
        assert_eq!(back.message_count, 12);
        assert_eq!(back.action_items[0].priority, Priority::High);
        assert_eq!(back.start_time, result.start_time);
        assert_eq!(back.metadata.total_tokens, 1110);
    }
}
