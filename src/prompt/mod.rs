//! Deterministic, length-aware prompt assembly.
//!
//! Produces a `(system_prompt, user_prompt)` pair from a message batch and
//! options. The builder itself never fails: when a budget is too small even
//! for the framing, it emits a minimal prompt the engine rejects downstream.

use chrono::Utc;
use serde::Serialize;

use crate::models::{Message, SummarizationContext, SummaryLength, SummaryOptions};

/// Rough approximation: 1 token ≈ 4 characters, rounded up. Conservative
/// for English prose.
const CHARS_PER_TOKEN: usize = 4;

/// Marker opening the messages section; truncation never cuts before it.
const MESSAGES_MARKER: &str = "## Messages to Summarize:";

const TRUNCATION_NOTICE_BUDGET: usize = 100;

/// Prompt-level metadata returned alongside the prompt text.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMetadata {
    pub message_count: usize,
    pub time_span: String,
    pub summary_length: SummaryLength,
    pub include_actions: bool,
    pub include_technical: bool,
    pub estimated_tokens: usize,
}

/// A complete prompt ready for the LLM client.
#[derive(Debug, Clone)]
pub struct SummarizationPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
    pub estimated_tokens: usize,
    pub metadata: PromptMetadata,
}

/// Builds prompts for conversation summarization.
#[derive(Debug, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Assemble the full prompt for a message batch.
    ///
    /// `custom_system_prompt` replaces the length-keyed template when given;
    /// option-driven additions are appended either way.
    pub fn build(
        &self,
        messages: &[Message],
        options: &SummaryOptions,
        context: Option<&SummarizationContext>,
        custom_system_prompt: Option<&str>,
    ) -> SummarizationPrompt {
        let system_prompt = self.build_system_prompt(options, custom_system_prompt);
        let user_prompt = self.build_user_prompt(messages, options, context);
        let estimated_tokens =
            self.estimate_token_count(&system_prompt) + self.estimate_token_count(&user_prompt);

        let metadata = PromptMetadata {
            message_count: messages.len(),
            time_span: time_span(messages),
            summary_length: options.length,
            include_actions: options.extract_action_items,
            include_technical: options.extract_technical_terms,
            estimated_tokens,
        };

        tracing::debug!(
            messages = messages.len(),
            estimated_tokens,
            length = %options.length,
            "built summarization prompt"
        );

        SummarizationPrompt {
            system_prompt,
            user_prompt,
            estimated_tokens,
            metadata,
        }
    }

    /// Length-keyed system template plus option-driven additions.
    pub fn build_system_prompt(
        &self,
        options: &SummaryOptions,
        custom_system_prompt: Option<&str>,
    ) -> String {
        let mut prompt = match custom_system_prompt {
            Some(custom) => custom.to_string(),
            None => match options.length {
                SummaryLength::Brief => BRIEF_SYSTEM_PROMPT.to_string(),
                SummaryLength::Detailed => DETAILED_SYSTEM_PROMPT.to_string(),
                SummaryLength::Comprehensive => COMPREHENSIVE_SYSTEM_PROMPT.to_string(),
            },
        };

        let additions = options.system_prompt_additions();
        if !additions.is_empty() {
            prompt.push_str("\n\nAdditional instructions:\n");
            for addition in additions {
                prompt.push_str(&format!("- {addition}\n"));
            }
        }

        prompt
    }

    /// Four sections in order: context, format instructions, messages,
    /// final instruction.
    pub fn build_user_prompt(
        &self,
        messages: &[Message],
        options: &SummaryOptions,
        context: Option<&SummarizationContext>,
    ) -> String {
        let mut parts = Vec::with_capacity(4);

        if let Some(ctx) = context {
            let section = context_section(ctx);
            if !section.is_empty() {
                parts.push(section);
            }
        }

        parts.push(format_instructions(options));
        parts.push(messages_section(messages, options));
        parts.push(final_instruction(options));

        parts.join("\n\n")
    }

    /// `ceil(chars / 4)`; never underestimates by more than the approximation
    /// error of the character heuristic itself.
    pub fn estimate_token_count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    /// Shrink `prompt` until its estimate fits `max_tokens`, cutting only
    /// inside the messages section and preferring message boundaries.
    pub fn optimize_prompt_length(
        &self,
        prompt: &str,
        max_tokens: usize,
        preserve_ratio: f64,
    ) -> String {
        let current = self.estimate_token_count(prompt);
        if current <= max_tokens {
            return prompt.to_string();
        }

        let target_chars = (max_tokens as f64 * preserve_ratio) as usize * CHARS_PER_TOKEN;

        let Some(marker_at) = prompt.find(MESSAGES_MARKER) else {
            // No recognizable structure: plain bounded cut.
            let kept = take_chars(prompt, target_chars);
            return format!("{kept}\n\n[Content truncated to fit limits]");
        };

        let prefix = &prompt[..marker_at];
        let prefix_chars = prefix.chars().count();
        let remaining_chars = target_chars
            .saturating_sub(prefix_chars)
            .saturating_sub(TRUNCATION_NOTICE_BUDGET);

        if remaining_chars == 0 {
            return format!("{prefix}\n\n[Content too long to summarize]");
        }

        let messages_part = &prompt[marker_at..];
        let messages_chars = messages_part.chars().count();
        if messages_chars <= remaining_chars {
            return prompt.to_string();
        }

        let mut kept = take_chars(messages_part, remaining_chars);
        // Prefer ending at a message boundary, provided at least half of the
        // section budget survives the cut.
        if let Some(boundary) = kept.rfind("\n\n**") {
            if kept[..boundary].chars().count() > remaining_chars / 2 {
                kept = &kept[..boundary];
            }
        }

        let cut_chars = messages_chars - kept.chars().count();
        tracing::debug!(cut_chars, max_tokens, "truncated prompt messages section");
        format!("{prefix}{kept}\n\n[Truncated {cut_chars} characters to fit limits]")
    }
}

/// The longest prefix of `s` holding at most `max_chars` characters.
fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

fn context_section(ctx: &SummarizationContext) -> String {
    let mut parts = vec!["## Context Information".to_string()];

    if let Some(channel) = &ctx.channel_name {
        parts.push(format!("**Channel**: #{channel}"));
    }
    if let Some(guild) = &ctx.guild_name {
        parts.push(format!("**Server**: {guild}"));
    }
    if let Some(hours) = ctx.time_span_hours {
        parts.push(format!("**Time Period**: {hours:.1} hours"));
    }
    if let Some(count) = ctx.total_participants {
        parts.push(format!("**Participants**: {count} users"));
    }
    if let Some(topic) = &ctx.topic {
        parts.push(format!("**Topic**: {topic}"));
    }

    if parts.len() == 1 {
        return String::new();
    }
    parts.join("\n")
}

fn format_instructions(options: &SummaryOptions) -> String {
    let mut lines = vec![
        "## Summary Instructions".to_string(),
        format!("- Summary length: {}", options.length),
    ];

    if options.include_bots {
        lines.push("- Include bot messages in analysis".to_string());
    } else {
        lines.push("- Ignore bot messages unless critically relevant".to_string());
    }

    if options.include_attachments {
        lines.push("- Attachment descriptions are included with messages".to_string());
    }

    if !options.extract_action_items {
        lines.push("- Do not extract action items".to_string());
    }
    if !options.extract_technical_terms {
        lines.push("- Do not define technical terms".to_string());
    }

    lines.join("\n")
}

fn messages_section(messages: &[Message], options: &SummaryOptions) -> String {
    let mut parts = vec![MESSAGES_MARKER.to_string()];

    for message in messages {
        if !message.has_substantial_content(options.include_attachments) {
            continue;
        }

        let mut lines = vec![format!(
            "**{}** ({})",
            message.author_name,
            message.timestamp.format("%H:%M")
        )];

        let clean = message.clean_content();
        if !clean.is_empty() {
            lines.push(clean);
        }

        if options.include_attachments && !message.attachments.is_empty() {
            let summaries: Vec<String> = message
                .attachments
                .iter()
                .map(|a| a.summary_text())
                .collect();
            lines.push(format!("[Attachments: {}]", summaries.join(", ")));
        }

        for block in &message.code_blocks {
            let lang = block
                .language
                .as_deref()
                .map(|l| format!(" ({l})"))
                .unwrap_or_default();
            lines.push(format!("[Code Block{lang}: {} chars]", block.code.len()));
        }

        if let Some(thread) = &message.thread {
            lines.push(format!("[Thread: {}]", thread.thread_name));
        }

        parts.push(lines.join("\n"));
        parts.push(String::new());
    }

    parts.join("\n")
}

fn final_instruction(options: &SummaryOptions) -> String {
    format!(
        "## Final Instructions\n\n\
         Analyze the above messages and create a {} summary following the specified JSON format.\n\n\
         Key requirements:\n\
         - Be accurate and objective\n\
         - Preserve important context\n\
         - Use clear, professional language\n\
         - Structure information logically\n\
         - Return valid JSON only",
        options.length
    )
}

/// Humanized span between the earliest and latest message timestamps.
fn time_span(messages: &[Message]) -> String {
    let Some(start) = messages.iter().map(|m| m.timestamp).min() else {
        return "Unknown".to_string();
    };
    let end = messages
        .iter()
        .map(|m| m.timestamp)
        .max()
        .unwrap_or_else(Utc::now);

    let secs = (end - start).num_seconds().max(0);
    if secs < 3600 {
        format!("{} minutes", secs / 60)
    } else if secs < 86_400 {
        format!("{:.1} hours", secs as f64 / 3600.0)
    } else {
        format!("{} days, {} hours", secs / 86_400, (secs % 86_400) / 3600)
    }
}

const BRIEF_SYSTEM_PROMPT: &str = r#"You are an expert at creating concise, actionable summaries of chat conversations. Your task is to distill lengthy discussions into their most essential elements.

For BRIEF summaries:
- Focus on the 3-5 most important points
- Extract only the most critical action items
- Keep technical explanations minimal
- Prioritize actionable information over background discussion

Response Format:
Return a JSON object with this structure:
```json
{
  "summary_text": "2-3 sentence overview of the main discussion",
  "key_points": ["point 1", "point 2", "point 3"],
  "action_items": [{"description": "task", "assignee": "user", "priority": "high|medium|low"}],
  "technical_terms": [{"term": "concept", "definition": "brief explanation"}],
  "participants": [{"name": "username", "key_contribution": "their main point"}]
}
```

Keep the summary focused, practical, and under 200 words total."#;

const DETAILED_SYSTEM_PROMPT: &str = r#"You are an expert at creating comprehensive summaries of chat conversations. Your task is to capture the full scope of discussions while maintaining clarity and organization.

For DETAILED summaries:
- Include all major discussion points and conclusions
- Extract actionable items with context
- Explain technical concepts clearly
- Show how different topics connect
- Highlight key participant contributions

Response Format:
Return a JSON object with this structure:
```json
{
  "summary_text": "Comprehensive overview covering all major aspects of the discussion",
  "key_points": ["detailed point 1", "detailed point 2", "..."],
  "action_items": [{"description": "detailed task", "assignee": "user", "priority": "high|medium|low", "context": "why this matters"}],
  "technical_terms": [{"term": "concept", "definition": "thorough explanation", "context": "how it was used"}],
  "participants": [{"name": "username", "key_contribution": "their main contributions", "message_count": number}]
}
```

Balance thoroughness with readability. Aim for 300-600 words total."#;

const COMPREHENSIVE_SYSTEM_PROMPT: &str = r#"You are an expert at creating exhaustive summaries of chat conversations. Your task is to capture every significant detail while organizing information logically.

For COMPREHENSIVE summaries:
- Document all discussion threads and their outcomes
- Include background context and reasoning
- Extract all actionable items, even minor ones
- Provide detailed technical explanations
- Show conversation evolution and decision-making process
- Highlight all meaningful participant contributions

Response Format:
Return a JSON object with this structure:
```json
{
  "summary_text": "Exhaustive overview covering all aspects, context, and implications",
  "key_points": ["comprehensive point 1", "comprehensive point 2", "..."],
  "action_items": [{"description": "detailed task with full context", "assignee": "user", "priority": "high|medium|low", "deadline": "if mentioned", "context": "full background"}],
  "technical_terms": [{"term": "concept", "definition": "complete explanation", "context": "usage context", "related_concepts": ["other terms"]}],
  "participants": [{"name": "username", "key_contribution": "all their contributions", "message_count": number, "expertise_shown": "domain knowledge displayed"}]
}
```

Leave nothing important out. Aim for 600-1000+ words as needed."#;
