//! Last-resort salvage: the whole response becomes the summary text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ExtractionStats, ParsingMetadata, ParsingMethod};

use super::ParsedSummary;

static BULLET_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•]|\d+\.)\s+(.*)$").expect("valid bullet regex"));

static SENTENCE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("valid sentence split regex"));

const MAX_SENTENCE_POINTS: usize = 5;
const MIN_SENTENCE_CHARS: usize = 11;

pub(super) fn parse(content: &str, meta: &mut ParsingMetadata) -> Option<ParsedSummary> {
    let summary_text = content.trim().to_string();
    if summary_text.is_empty() {
        meta.warnings
            .push("freeform parser: response is empty".to_string());
        return None;
    }

    // Bullet and numbered lines become key points; failing that, the longer
    // sentences stand in.
    let mut key_points: Vec<String> = content
        .lines()
        .filter_map(|line| {
            BULLET_LINE
                .captures(line.trim())
                .map(|c| c.get(1).expect("group 1").as_str().trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .collect();

    if key_points.is_empty() {
        key_points = SENTENCE_SPLIT
            .split(&summary_text)
            .map(str::trim)
            .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
            .take(MAX_SENTENCE_POINTS)
            .map(str::to_string)
            .collect();
    }

    meta.parsing_method = Some(ParsingMethod::Freeform);
    meta.extraction_stats = Some(ExtractionStats {
        key_points: key_points.len(),
        ..Default::default()
    });

    Some(ParsedSummary {
        summary_text,
        key_points,
        // Action items, terms, and participants cannot be recovered
        // reliably from freeform text; message analysis fills participants.
        action_items: Vec::new(),
        technical_terms: Vec::new(),
        participants: Vec::new(),
        raw_response: content.to_string(),
        parsing: ParsingMetadata::default(),
    })
}
