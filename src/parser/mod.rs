//! LLM response parsing, resilient to format drift.
//!
//! A response is run through a fallback chain: strict JSON extraction,
//! then markdown sections, then a freeform salvage pass. Each strategy is
//! total — it never fails, it either returns a parsed summary or `None`
//! and records why in the parsing metadata. The chain stops at the first
//! success; if nothing succeeds the caller gets `RESPONSE_PARSE_FAILED`.

mod freeform;
mod json;
mod markdown;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, SummaryError};
use crate::models::{
    ActionItem, FinalStats, Message, Participant, ParsingMetadata, SummarizationContext,
    SummaryMetadata, SummaryResult, TechnicalTerm,
};

const EMPTY_SUMMARY_FALLBACK: &str = "Summary could not be extracted from response.";
const MAX_SUMMARY_CHARS: usize = 2000;
const MAX_KEY_POINTS: usize = 10;
const MAX_ACTION_ITEMS: usize = 20;
const MAX_TECHNICAL_TERMS: usize = 15;
const MIN_KEY_POINT_CHARS: usize = 6;
const MAX_CONTRIBUTIONS_PER_AUTHOR: usize = 3;
const CONTRIBUTION_SNIPPET_CHARS: usize = 50;

/// Structured summary extracted from a raw LLM response. The engine adds
/// the framing fields (channel, guild, time range, message count) to turn
/// this into a [`SummaryResult`].
#[derive(Debug, Clone)]
pub struct ParsedSummary {
    pub summary_text: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub technical_terms: Vec<TechnicalTerm>,
    pub participants: Vec<Participant>,
    pub raw_response: String,
    pub parsing: ParsingMetadata,
}

/// Parses LLM responses into structured summaries.
#[derive(Debug, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    /// Run the fallback chain, then enrich the result with per-author
    /// analysis of the original messages and enforce the output caps.
    pub fn parse_summary_response(
        &self,
        response_content: &str,
        original_messages: &[Message],
        include_attachments: bool,
    ) -> Result<ParsedSummary> {
        let mut meta = ParsingMetadata {
            response_length: response_content.chars().count(),
            ..Default::default()
        };

        tracing::debug!(
            response_length = meta.response_length,
            "parsing LLM response"
        );

        let parsed = json::parse(response_content, &mut meta)
            .or_else(|| markdown::parse(response_content, &mut meta))
            .or_else(|| freeform::parse(response_content, &mut meta));

        let Some(parsed) = parsed else {
            tracing::error!(warnings = ?meta.warnings, "all response parsers failed");
            return Err(SummaryError::ResponseParseFailed {
                warnings: meta.warnings,
            });
        };

        if let Some(method) = meta.parsing_method {
            tracing::debug!(?method, "response parsed");
        }

        let enhanced =
            enhance_with_message_analysis(parsed, original_messages, include_attachments);
        Ok(validate_and_clean(enhanced, meta))
    }

    /// Attach the framing fields the parser cannot know to produce the
    /// final record. LLM usage metadata is filled in by the engine.
    #[allow(clippy::too_many_arguments)]
    pub fn extract_summary_result(
        &self,
        parsed: ParsedSummary,
        channel_id: &str,
        guild_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        message_count: usize,
        context: Option<SummarizationContext>,
    ) -> SummaryResult {
        SummaryResult {
            id: Uuid::new_v4(),
            channel_id: channel_id.to_string(),
            guild_id: guild_id.to_string(),
            start_time,
            end_time,
            message_count,
            summary_text: parsed.summary_text,
            key_points: parsed.key_points,
            action_items: parsed.action_items,
            technical_terms: parsed.technical_terms,
            participants: parsed.participants,
            metadata: SummaryMetadata {
                parsing: parsed.parsing,
                ..Default::default()
            },
            created_at: Utc::now(),
            context,
        }
    }
}

/// Overlay ground truth from the original messages onto the parsed
/// participant list: exact message counts and up to three content snippets
/// per author, with authors the LLM missed inserted.
fn enhance_with_message_analysis(
    mut parsed: ParsedSummary,
    messages: &[Message],
    include_attachments: bool,
) -> ParsedSummary {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut contributions: HashMap<String, Vec<String>> = HashMap::new();
    // Preserve first-seen ordering so equal-count participants sort stably.
    let mut author_order: Vec<String> = Vec::new();

    for message in messages {
        let author = message.author_name.clone();
        let count = counts.entry(author.clone()).or_insert(0);
        if *count == 0 {
            author_order.push(author.clone());
        }
        *count += 1;

        if message.has_substantial_content(include_attachments) {
            if let Some(snippet) = message.content_summary(CONTRIBUTION_SNIPPET_CHARS) {
                let entries = contributions.entry(author).or_default();
                if entries.len() < MAX_CONTRIBUTIONS_PER_AUTHOR {
                    entries.push(snippet);
                }
            }
        }
    }

    let mut existing: HashMap<String, Participant> = parsed
        .participants
        .drain(..)
        .map(|p| (p.display_name.to_lowercase(), p))
        .collect();

    let mut updated = Vec::with_capacity(author_order.len());
    for author in author_order {
        let count = counts[&author];
        let computed = contributions.remove(&author).unwrap_or_default();

        match existing.remove(&author.to_lowercase()) {
            Some(mut participant) => {
                participant.message_count = count;
                participant.key_contributions = computed;
                updated.push(participant);
            }
            None => updated.push(Participant {
                display_name: author,
                message_count: count,
                key_contributions: computed,
            }),
        }
    }

    updated.sort_by(|a, b| b.message_count.cmp(&a.message_count));
    parsed.participants = updated;
    parsed
}

/// Enforce the output caps; violations are truncated, never rejected.
fn validate_and_clean(mut parsed: ParsedSummary, mut meta: ParsingMetadata) -> ParsedSummary {
    if parsed.summary_text.trim().is_empty() {
        tracing::warn!("parsed summary has empty text, substituting fallback notice");
        parsed.summary_text = EMPTY_SUMMARY_FALLBACK.to_string();
    }

    if parsed.summary_text.chars().count() > MAX_SUMMARY_CHARS {
        parsed.summary_text = parsed.summary_text.chars().take(MAX_SUMMARY_CHARS).collect();
    }
    parsed.key_points.truncate(MAX_KEY_POINTS);
    parsed.action_items.truncate(MAX_ACTION_ITEMS);
    parsed.technical_terms.truncate(MAX_TECHNICAL_TERMS);

    parsed
        .key_points
        .retain(|point| point.trim().chars().count() >= MIN_KEY_POINT_CHARS);

    meta.final_stats = Some(FinalStats {
        summary_length: parsed.summary_text.chars().count(),
        key_points: parsed.key_points.len(),
        action_items: parsed.action_items.len(),
        technical_terms: parsed.technical_terms.len(),
        participants: parsed.participants.len(),
    });

    parsed.parsing = meta;
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParsingMethod, Priority};
    use chrono::TimeZone;

    fn msg(id: &str, author: &str, content: &str) -> Message {
        Message {
            id: id.into(),
            author_name: author.into(),
            author_id: format!("id-{author}"),
            content: content.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            attachments: vec![],
            code_blocks: vec![],
            thread: None,
            is_bot: false,
        }
    }

    #[test]
    fn json_response_parses_first() {
        let parser = ResponseParser::new();
        let content = r#"```json
{
  "summary_text": "Ten test messages discussed X.",
  "key_points": ["decided to ship Friday", "rollback plan agreed", "metrics dashboard next"],
  "action_items": [{"description": "write runbook", "assignee": "alice", "priority": "high"}],
  "technical_terms": [],
  "participants": [{"name": "alice", "key_contribution": "led the decision"}]
}
```"#;
        let messages: Vec<Message> = (0..10)
            .map(|i| msg(&i.to_string(), if i < 7 { "alice" } else { "bob" }, "hello world"))
            .collect();

        let parsed = parser
            .parse_summary_response(content, &messages, true)
            .unwrap();
        assert_eq!(parsed.summary_text, "Ten test messages discussed X.");
        assert_eq!(parsed.parsing.parsing_method, Some(ParsingMethod::Json));
        assert_eq!(parsed.key_points.len(), 3);
        assert_eq!(parsed.action_items[0].priority, Priority::High);
        // Message analysis overlays exact counts and sorts by activity.
        assert_eq!(parsed.participants[0].display_name, "alice");
        assert_eq!(parsed.participants[0].message_count, 7);
        assert_eq!(parsed.participants[1].display_name, "bob");
        assert_eq!(parsed.participants[1].message_count, 3);
    }

    #[test]
    fn markdown_fallback_when_json_absent() {
        let parser = ResponseParser::new();
        let content = "## Summary\nTopic was X.\n\n## Key Points\n- A longer point one\n- A longer point two\n";
        let parsed = parser.parse_summary_response(content, &[], true).unwrap();
        assert_eq!(parsed.parsing.parsing_method, Some(ParsingMethod::Markdown));
        assert!(parsed.summary_text.contains("Topic was X"));
        assert_eq!(parsed.key_points.len(), 2);
        // The json attempt left a warning behind.
        assert!(parsed.parsing.warnings.iter().any(|w| w.contains("json")));
    }

    #[test]
    fn freeform_salvage_when_nothing_is_structured() {
        let parser = ResponseParser::new();
        let content = "The group talked about release timing. Everyone agreed to wait for QA sign-off before shipping.";
        let parsed = parser.parse_summary_response(content, &[], true).unwrap();
        assert_eq!(parsed.parsing.parsing_method, Some(ParsingMethod::Freeform));
        assert_eq!(parsed.summary_text, content);
        assert!(!parsed.key_points.is_empty());
    }

    #[test]
    fn empty_response_fails_with_parse_error() {
        let parser = ResponseParser::new();
        let err = parser
            .parse_summary_response("   \n  ", &[], true)
            .unwrap_err();
        assert_eq!(
            err.code(),
            crate::error::ErrorCode::ResponseParseFailed
        );
    }

    #[test]
    fn caps_are_enforced_by_truncation() {
        let parser = ResponseParser::new();
        let key_points: Vec<String> = (0..30).map(|i| format!("\"key point number {i}\"")).collect();
        let actions: Vec<String> = (0..30).map(|i| format!("\"do the thing {i}\"")).collect();
        let content = format!(
            r#"{{"summary_text": "{}", "key_points": [{}], "action_items": [{}]}}"#,
            "s".repeat(3000),
            key_points.join(","),
            actions.join(","),
        );

        let parsed = parser.parse_summary_response(&content, &[], true).unwrap();
        assert_eq!(parsed.summary_text.chars().count(), 2000);
        assert_eq!(parsed.key_points.len(), 10);
        assert_eq!(parsed.action_items.len(), 20);

        let stats = parsed.parsing.final_stats.unwrap();
        assert_eq!(stats.summary_length, 2000);
        assert_eq!(stats.key_points, 10);
    }

    #[test]
    fn short_key_points_are_dropped() {
        let parser = ResponseParser::new();
        let content = r#"{"summary_text": "Discussion.", "key_points": ["ok", "a substantive point"]}"#;
        let parsed = parser.parse_summary_response(content, &[], true).unwrap();
        assert_eq!(parsed.key_points, vec!["a substantive point"]);
    }

    #[test]
    fn empty_summary_gets_fallback_notice() {
        let parser = ResponseParser::new();
        let content = r#"{"summary_text": "", "key_points": ["a substantive point"]}"#;
        let parsed = parser.parse_summary_response(content, &[], true).unwrap();
        assert_eq!(parsed.summary_text, EMPTY_SUMMARY_FALLBACK);
    }

    #[test]
    fn analysis_inserts_missing_authors_and_overwrites_counts() {
        let parser = ResponseParser::new();
        let content = r#"{"summary_text": "Chat about deploys.", "participants": [{"name": "ALICE", "message_count": 99, "key_contribution": "stale claim"}]}"#;
        let messages = vec![
            msg("1", "alice", "first message about deploys"),
            msg("2", "alice", "second message with details"),
            msg("3", "carol", "a question about rollback"),
        ];

        let parsed = parser
            .parse_summary_response(content, &messages, true)
            .unwrap();
        let alice = parsed
            .participants
            .iter()
            .find(|p| p.display_name.eq_ignore_ascii_case("alice"))
            .unwrap();
        // LLM-claimed count replaced by the real one; case-insensitive merge
        // keeps the parsed display name.
        assert_eq!(alice.message_count, 2);
        assert_eq!(alice.key_contributions.len(), 2);

        let carol = parsed
            .participants
            .iter()
            .find(|p| p.display_name == "carol")
            .unwrap();
        assert_eq!(carol.message_count, 1);
    }

    #[test]
    fn contributions_cap_at_three_snippets() {
        let parser = ResponseParser::new();
        let content = r#"{"summary_text": "Busy channel."}"#;
        let messages: Vec<Message> = (0..6)
            .map(|i| msg(&i.to_string(), "dave", &format!("message number {i} with plenty of text")))
            .collect();
        let parsed = parser
            .parse_summary_response(content, &messages, true)
            .unwrap();
        assert_eq!(parsed.participants[0].key_contributions.len(), 3);
    }

    #[test]
    fn framing_fields_come_from_the_caller() {
        let parser = ResponseParser::new();
        let parsed = parser
            .parse_summary_response(r#"{"summary_text": "Done."}"#, &[], true)
            .unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let result =
            parser.extract_summary_result(parsed, "c1", "g1", start, end, 12, None);
        assert_eq!(result.channel_id, "c1");
        assert_eq!(result.message_count, 12);
        assert_eq!(result.start_time, start);
        assert!(result.start_time <= result.end_time);
    }
}
