//! Chat message snapshot types consumed by the summarization pipeline.
//!
//! Messages are produced by the upstream fetcher, passed into the engine
//! once, and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl Attachment {
    /// Short descriptor used when rendering attachments into prompts.
    pub fn summary_text(&self) -> String {
        match &self.content_type {
            Some(ct) => format!("{} ({ct})", self.filename),
            None => self.filename.clone(),
        }
    }
}

/// A fenced code block extracted from message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    #[serde(default)]
    pub language: Option<String>,
    pub code: String,
}

/// Thread descriptor for messages posted in (or starting) a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub thread_name: String,
    /// Id of the message that started the thread.
    pub starter_message_id: String,
}

/// An immutable snapshot of a single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Display name of the author at the time the message was fetched.
    pub author_name: String,
    /// Stable platform user id.
    pub author_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
    #[serde(default)]
    pub thread: Option<ThreadInfo>,
    #[serde(default)]
    pub is_bot: bool,
}

impl Message {
    /// Content with whitespace runs collapsed to single spaces and trimmed.
    pub fn clean_content(&self) -> String {
        self.content.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Whether this message carries anything worth summarizing: non-empty
    /// cleaned text, or at least one attachment when attachments count.
    pub fn has_substantial_content(&self, include_attachments: bool) -> bool {
        if !self.clean_content().is_empty() {
            return true;
        }
        include_attachments && !self.attachments.is_empty()
    }

    /// A snippet of the cleaned content capped at `max_chars`, or `None`
    /// for messages with no text.
    pub fn content_summary(&self, max_chars: usize) -> Option<String> {
        let clean = self.clean_content();
        if clean.is_empty() {
            return None;
        }
        if clean.chars().count() <= max_chars {
            Some(clean)
        } else {
            let truncated: String = clean.chars().take(max_chars).collect();
            Some(format!("{truncated}..."))
        }
    }

    /// Whether this message started the thread it belongs to.
    pub fn starts_thread(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|t| t.starter_message_id == self.id)
    }
}
