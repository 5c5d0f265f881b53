//! Pre-summarization optimization: content filtering, deduplication,
//! smart truncation, batch request dedup, and no-network cost estimates.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::llm::registry;
use crate::models::{Message, SummaryOptions};
use crate::prompt::PromptBuilder;
use crate::utils::short_digest;

const MAX_MESSAGE_AGE_DAYS: i64 = 90;
const CONTENT_HASH_HEX_CHARS: usize = 16;

/// What the optimizer did to a message list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizationStats {
    pub original_count: usize,
    pub filtered_count: usize,
    pub deduplication_removed: usize,
    pub truncated_count: usize,
    pub final_count: usize,
    pub reduction_ratio: f64,
    pub optimization_applied: Vec<String>,
}

/// Predicted benefit of optimizing, without touching the list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizationEstimate {
    pub current_message_count: usize,
    pub estimated_after_filtering: usize,
    pub estimated_duplicates: usize,
    pub potential_token_savings: usize,
    pub potential_cost_savings_usd: f64,
}

/// Cost estimate for a summarization request, computed statically.
#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub estimated_cost_usd: f64,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
    pub model: String,
    pub message_count: usize,
}

/// A summarization request as seen by batch deduplication.
pub struct BatchRequestKey<'a> {
    pub channel_id: &'a str,
    pub guild_id: &'a str,
    pub messages: &'a [Message],
    pub options: &'a SummaryOptions,
}

/// Optimizes summarization inputs for cost and quality.
#[derive(Debug, Default)]
pub struct SummaryOptimizer {
    prompt_builder: PromptBuilder,
}

impl SummaryOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter, deduplicate, and (optionally) truncate a message list,
    /// returning the surviving messages in chronological order plus stats.
    pub fn optimize_message_list(
        &self,
        messages: &[Message],
        options: &SummaryOptions,
        max_messages: Option<usize>,
    ) -> (Vec<Message>, OptimizationStats) {
        let mut stats = OptimizationStats {
            original_count: messages.len(),
            ..Default::default()
        };

        let mut optimized = self.filter_by_content_quality(messages, options);
        stats.filtered_count = optimized.len();
        if stats.filtered_count < stats.original_count {
            stats.optimization_applied.push("content_filtering".into());
        }

        let before_dedup = optimized.len();
        optimized = self.remove_duplicate_messages(optimized);
        stats.deduplication_removed = before_dedup - optimized.len();
        if stats.deduplication_removed > 0 {
            stats.optimization_applied.push("deduplication".into());
        }

        if let Some(cap) = max_messages {
            if optimized.len() > cap {
                optimized = self.smart_truncate_messages(optimized, cap);
                stats.truncated_count = messages.len() - optimized.len();
                stats.optimization_applied.push("smart_truncation".into());
            }
        }

        stats.final_count = optimized.len();
        stats.reduction_ratio = (stats.original_count - stats.final_count) as f64
            / stats.original_count.max(1) as f64;

        tracing::debug!(
            original = stats.original_count,
            final_count = stats.final_count,
            applied = ?stats.optimization_applied,
            "optimized message list"
        );

        (optimized, stats)
    }

    /// Predict what optimization would save, without applying it.
    pub fn estimate_optimization_benefit(
        &self,
        messages: &[Message],
        options: &SummaryOptions,
    ) -> OptimizationEstimate {
        let substantial = messages
            .iter()
            .filter(|m| m.has_substantial_content(options.include_attachments))
            .count();

        let mut seen = HashSet::new();
        let mut duplicates = 0usize;
        for message in messages {
            if !seen.insert(content_hash(message)) {
                duplicates += 1;
            }
        }

        let original_chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
        let kept_chars: usize = messages
            .iter()
            .filter(|m| m.has_substantial_content(options.include_attachments))
            .map(|m| m.content.chars().count())
            .sum();
        // Duplicates are counted at a flat per-message estimate.
        let kept_chars = kept_chars.saturating_sub(duplicates * 100);

        let token_savings = original_chars.saturating_sub(kept_chars) / 4;
        let cost_savings = registry::lookup(&options.model)
            .map(|pricing| token_savings as f64 / 1000.0 * pricing.input_per_1k)
            .unwrap_or(0.0);

        OptimizationEstimate {
            current_message_count: messages.len(),
            estimated_after_filtering: substantial,
            estimated_duplicates: duplicates,
            potential_token_savings: token_savings,
            potential_cost_savings_usd: cost_savings,
        }
    }

    /// Drop duplicate requests from a batch by signature, keeping first
    /// occurrences and input order. Returns the surviving indices.
    pub fn dedup_batch_requests(&self, requests: &[BatchRequestKey<'_>]) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(requests.len());

        for (idx, request) in requests.iter().enumerate() {
            let signature = request_signature(request);
            if seen.insert(signature) {
                kept.push(idx);
            }
        }

        if kept.len() < requests.len() {
            tracing::debug!(
                dropped = requests.len() - kept.len(),
                "deduplicated batch requests"
            );
        }
        kept
    }

    /// Build the prompt and price it against the model registry. Never
    /// performs network I/O.
    pub fn estimate_cost(&self, messages: &[Message], options: &SummaryOptions) -> CostEstimate {
        let prompt = self.prompt_builder.build(messages, options, None, None);
        let input_tokens = prompt.estimated_tokens;
        let output_tokens = options.output_token_budget() as usize;

        let cost = registry::estimate_cost(&options.model, input_tokens as u32, output_tokens as u32);

        CostEstimate {
            estimated_cost_usd: cost,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            model: options.model.clone(),
            message_count: messages.len(),
        }
    }

    fn filter_by_content_quality(
        &self,
        messages: &[Message],
        options: &SummaryOptions,
    ) -> Vec<Message> {
        let cutoff = Utc::now() - Duration::days(MAX_MESSAGE_AGE_DAYS);

        messages
            .iter()
            .filter(|m| m.has_substantial_content(options.include_attachments))
            .filter(|m| options.include_bots || !m.is_bot)
            .filter(|m| !options.excluded_users.contains(&m.author_id))
            .filter(|m| m.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    fn remove_duplicate_messages(&self, messages: Vec<Message>) -> Vec<Message> {
        let mut seen = HashSet::new();
        messages
            .into_iter()
            .filter(|m| seen.insert(content_hash(m)))
            .collect()
    }

    /// Keep the `max_count` highest-scoring messages, then restore
    /// chronological order. Sorting is stable, so equal scores keep their
    /// relative input order.
    fn smart_truncate_messages(&self, messages: Vec<Message>, max_count: usize) -> Vec<Message> {
        if messages.len() <= max_count {
            return messages;
        }

        let mut author_counts: HashMap<&str, usize> = HashMap::new();
        for message in &messages {
            *author_counts.entry(message.author_name.as_str()).or_insert(0) += 1;
        }

        let now = Utc::now();
        let mut scored: Vec<(f64, &Message)> = messages
            .iter()
            .map(|m| (score_message(m, &author_counts, now), m))
            .collect();

        // Ties break on timestamp then id so the selected set does not
        // depend on input order.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.timestamp.cmp(&b.1.timestamp))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        let mut selected: Vec<Message> = scored
            .into_iter()
            .take(max_count)
            .map(|(_, m)| m.clone())
            .collect();

        selected.sort_by_key(|m| m.timestamp);
        selected
    }
}

/// Additive importance score. Content length and author activity are
/// normalized; attachments, code, recency, and thread starts earn bonuses.
fn score_message(
    message: &Message,
    author_counts: &HashMap<&str, usize>,
    now: chrono::DateTime<Utc>,
) -> f64 {
    let mut score = 0.0;

    let content_length = message.clean_content().chars().count() as f64;
    score += (content_length / 100.0).min(10.0);

    let activity = *author_counts
        .get(message.author_name.as_str())
        .unwrap_or(&0) as f64;
    score += (activity / 5.0).min(5.0);

    if !message.attachments.is_empty() {
        score += 3.0;
    }
    if !message.code_blocks.is_empty() {
        score += 2.0;
    }
    if (now - message.timestamp).num_seconds() < 3600 {
        score += 2.0;
    }
    if message.starts_thread() {
        score += 3.0;
    }

    score
}

/// 16-hex-char digest of `lowercase(author):whitespace-stripped-lowercase(content)`.
fn content_hash(message: &Message) -> String {
    let content: String = message
        .content
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let basis = format!("{}:{content}", message.author_name.to_lowercase());
    short_digest(&basis, CONTENT_HASH_HEX_CHARS)
}

/// Stable signature over the identifying facts of a batch request.
fn request_signature(request: &BatchRequestKey<'_>) -> String {
    let (start, end) = match (
        request.messages.iter().map(|m| m.timestamp).min(),
        request.messages.iter().map(|m| m.timestamp).max(),
    ) {
        (Some(s), Some(e)) => (s.to_rfc3339(), e.to_rfc3339()),
        _ => (String::new(), String::new()),
    };

    let basis = format!(
        "{}:{}:{}:{}:{start}:{end}",
        request.channel_id,
        request.guild_id,
        request.messages.len(),
        request.options.fingerprint(),
    );
    short_digest(&basis, CONTENT_HASH_HEX_CHARS)
}
