//! Strict JSON extraction: fenced code block first, then the widest
//! `{...}` substring.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{
    ActionItem, ExtractionStats, Participant, ParsingMetadata, ParsingMethod, Priority,
    TechnicalTerm,
};

use super::ParsedSummary;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced-json regex")
});

pub(super) fn parse(content: &str, meta: &mut ParsingMetadata) -> Option<ParsedSummary> {
    let Some(json_str) = extract_json(content) else {
        meta.warnings.push("json parser: no JSON object found".to_string());
        return None;
    };

    let data: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(err) => {
            meta.warnings.push(format!("json parser: decode error: {err}"));
            return None;
        }
    };

    let summary_text = data
        .get("summary_text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let key_points = string_list(data.get("key_points"));
    let action_items = parse_action_items(data.get("action_items"));
    let technical_terms = parse_technical_terms(data.get("technical_terms"));
    let participants = parse_participants(data.get("participants"));

    meta.parsing_method = Some(ParsingMethod::Json);
    meta.extraction_stats = Some(ExtractionStats {
        key_points: key_points.len(),
        action_items: action_items.len(),
        technical_terms: technical_terms.len(),
        participants: participants.len(),
    });

    Some(ParsedSummary {
        summary_text,
        key_points,
        action_items,
        technical_terms,
        participants,
        raw_response: content.to_string(),
        parsing: ParsingMetadata::default(),
    })
}

/// Fenced block wins; otherwise the span from the first `{` to the last `}`.
fn extract_json(content: &str) -> Option<&str> {
    if let Some(captures) = FENCED_JSON.captures(content) {
        return Some(captures.get(1).expect("group 1 exists").as_str());
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Action items may arrive as objects or plain strings.
fn parse_action_items(value: Option<&Value>) -> Vec<ActionItem> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => {
                let priority = map
                    .get("priority")
                    .and_then(Value::as_str)
                    .map(Priority::parse_lenient)
                    .unwrap_or_default();
                Some(ActionItem {
                    description: map
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    assignee: map
                        .get("assignee")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    priority,
                    completed: false,
                })
            }
            Value::String(s) => Some(ActionItem::new(s.clone())),
            _ => None,
        })
        .collect()
}

fn parse_technical_terms(value: Option<&Value>) -> Vec<TechnicalTerm> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let map = item.as_object()?;
            Some(TechnicalTerm {
                term: map
                    .get("term")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                definition: map
                    .get("definition")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                context: map
                    .get("context")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

fn parse_participants(value: Option<&Value>) -> Vec<Participant> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let map = item.as_object()?;
            let contributions = match map.get("key_contribution").or(map.get("key_contributions")) {
                Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
                Some(Value::Array(list)) => list
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            Some(Participant {
                display_name: map
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                message_count: map
                    .get("message_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as usize,
                key_contributions: contributions,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(content: &str) -> ParsedSummary {
        let mut meta = ParsingMetadata::default();
        parse(content, &mut meta).expect("json parse")
    }

    #[test]
    fn fenced_block_is_preferred() {
        let content = "Here is the summary:\n```json\n{\"summary_text\": \"fenced\"}\n```\nAnd some trailing {\"summary_text\": \"bare\"} text";
        assert_eq!(parse_ok(content).summary_text, "fenced");
    }

    #[test]
    fn bare_braces_fallback() {
        let content = "noise before {\"summary_text\": \"bare json\"} noise after";
        assert_eq!(parse_ok(content).summary_text, "bare json");
    }

    #[test]
    fn unfenced_block_without_language_tag() {
        let content = "```\n{\"summary_text\": \"plain fence\"}\n```";
        assert_eq!(parse_ok(content).summary_text, "plain fence");
    }

    #[test]
    fn invalid_priority_coerces_to_medium() {
        let content = r#"{"summary_text": "s", "action_items": [{"description": "d", "priority": "blocker"}]}"#;
        assert_eq!(parse_ok(content).action_items[0].priority, Priority::Medium);
    }

    #[test]
    fn action_items_accept_plain_strings() {
        let content = r#"{"summary_text": "s", "action_items": ["just do it", {"description": "obj", "priority": "low"}]}"#;
        let parsed = parse_ok(content);
        assert_eq!(parsed.action_items.len(), 2);
        assert_eq!(parsed.action_items[0].description, "just do it");
        assert_eq!(parsed.action_items[1].priority, Priority::Low);
    }

    #[test]
    fn contribution_accepts_string_or_array() {
        let content = r#"{"summary_text": "s", "participants": [
            {"name": "a", "key_contribution": "one thing"},
            {"name": "b", "key_contribution": ["x", "y"]}
        ]}"#;
        let parsed = parse_ok(content);
        assert_eq!(parsed.participants[0].key_contributions, vec!["one thing"]);
        assert_eq!(parsed.participants[1].key_contributions.len(), 2);
    }

    #[test]
    fn missing_json_records_warning() {
        let mut meta = ParsingMetadata::default();
        assert!(parse("no braces here at all", &mut meta).is_none());
        assert_eq!(meta.warnings.len(), 1);
    }

    #[test]
    fn malformed_json_records_warning() {
        let mut meta = ParsingMetadata::default();
        assert!(parse("{not valid json]", &mut meta).is_none());
        assert!(meta.warnings[0].contains("decode error"));
    }

    #[test]
    fn extraction_stats_count_fields() {
        let content = r#"{"summary_text": "s", "key_points": ["a", "b"], "technical_terms": [{"term": "t", "definition": "d"}]}"#;
        let mut meta = ParsingMetadata::default();
        parse(content, &mut meta).unwrap();
        let stats = meta.extraction_stats.unwrap();
        assert_eq!(stats.key_points, 2);
        assert_eq!(stats.technical_terms, 1);
        assert_eq!(stats.action_items, 0);
    }
}
