//! Markdown section extraction: `## Summary`, `## Key Points`, and friends.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    ActionItem, ExtractionStats, Participant, ParsingMetadata, ParsingMethod, TechnicalTerm,
};

use super::ParsedSummary;

/// A line that opens a recognized section, with or without `#` markers.
static SECTION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:#{1,6}\s*)?(summary|key points?|action items?|technical terms?|participants?)\s*:?\s*$")
        .expect("valid section header regex")
});

/// A bulleted (`-`, `*`, `•`) or numbered (`1.`) list item.
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•]|\d+\.)\s+(.*)$").expect("valid list item regex"));

/// `Name (N messages): contribution`; lines without a count fall back to a
/// plain `Name: contribution` split.
static PARTICIPANT_WITH_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s*\((\d+)\s+messages?\)\s*:?\s*(.*)$")
        .expect("valid participant regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    KeyPoints,
    ActionItems,
    TechnicalTerms,
    Participants,
}

impl Section {
    fn from_title(title: &str) -> Option<Self> {
        let lower = title.to_lowercase();
        if lower.starts_with("summary") {
            Some(Section::Summary)
        } else if lower.starts_with("key point") {
            Some(Section::KeyPoints)
        } else if lower.starts_with("action item") {
            Some(Section::ActionItems)
        } else if lower.starts_with("technical term") {
            Some(Section::TechnicalTerms)
        } else if lower.starts_with("participant") {
            Some(Section::Participants)
        } else {
            None
        }
    }
}

pub(super) fn parse(content: &str, meta: &mut ParsingMetadata) -> Option<ParsedSummary> {
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut key_points: Vec<String> = Vec::new();
    let mut action_lines: Vec<String> = Vec::new();
    let mut term_lines: Vec<String> = Vec::new();
    let mut participant_lines: Vec<String> = Vec::new();
    let mut recognized_any = false;
    let mut current: Option<Section> = None;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(captures) = SECTION_HEADER.captures(trimmed) {
            current = Section::from_title(captures.get(1).expect("group 1").as_str());
            recognized_any |= current.is_some();
            continue;
        }

        match current {
            Some(Section::Summary) => {
                if !trimmed.is_empty() {
                    summary_lines.push(trimmed);
                }
            }
            Some(section) => {
                if let Some(captures) = LIST_ITEM.captures(trimmed) {
                    let item = captures.get(1).expect("group 1").as_str().trim().to_string();
                    if item.is_empty() {
                        continue;
                    }
                    match section {
                        Section::KeyPoints => key_points.push(item),
                        Section::ActionItems => action_lines.push(item),
                        Section::TechnicalTerms => term_lines.push(item),
                        Section::Participants => participant_lines.push(item),
                        Section::Summary => unreachable!(),
                    }
                }
            }
            None => {}
        }
    }

    let summary_text = summary_lines.join(" ");
    let extracted_anything = !summary_text.is_empty()
        || !key_points.is_empty()
        || !action_lines.is_empty()
        || !term_lines.is_empty()
        || !participant_lines.is_empty();

    if !recognized_any || !extracted_anything {
        meta.warnings
            .push("markdown parser: no recognizable sections".to_string());
        return None;
    }

    let action_items: Vec<ActionItem> = action_lines.into_iter().map(ActionItem::new).collect();
    let technical_terms: Vec<TechnicalTerm> = term_lines
        .iter()
        .filter_map(|line| {
            let (term, definition) = line.split_once(':')?;
            Some(TechnicalTerm {
                term: term.trim().to_string(),
                definition: definition.trim().to_string(),
                context: String::new(),
            })
        })
        .collect();
    let participants: Vec<Participant> = participant_lines
        .iter()
        .filter_map(|line| parse_participant_line(line))
        .collect();

    meta.parsing_method = Some(ParsingMethod::Markdown);
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

fn parse_participant_line(line: &str) -> Option<Participant> {
    if let Some(captures) = PARTICIPANT_WITH_COUNT.captures(line) {
        let name = captures.get(1).expect("group 1").as_str().trim();
        if name.is_empty() {
            return None;
        }
        let count = captures
            .get(2)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(0);
        let contribution = captures.get(3).map(|m| m.as_str().trim()).unwrap_or("");
        return Some(Participant {
            display_name: name.to_string(),
            message_count: count,
            key_contributions: if contribution.is_empty() {
                Vec::new()
            } else {
                vec![contribution.to_string()]
            },
        });
    }

    let (name, contribution) = match line.split_once(':') {
        Some((n, c)) => (n.trim(), c.trim()),
        None => (line.trim(), ""),
    };
    if name.is_empty() {
        return None;
    }
    Some(Participant {
        display_name: name.to_string(),
        message_count: 0,
        key_contributions: if contribution.is_empty() {
            Vec::new()
        } else {
            vec![contribution.to_string()]
        },
    })
}
