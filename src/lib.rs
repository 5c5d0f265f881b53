//! chatsum - AI Chat Conversation Summarization Core
//!
//! Turns batches of chat messages into structured AI-generated summaries:
//! a bounded prompt is built from the filtered batch, a rate-limited LLM
//! request is driven through retries, the possibly-malformed response is
//! parsed through a fallback chain, and the result is memoized under a
//! fingerprint that guarantees cache correctness.
//!
//! ## Pipeline
//!
//! ```text
//! messages ─▶ optimizer ─▶ prompt builder ─▶ LLM client ─▶ parser ─▶ SummaryResult
//!                 │                                                      │
//!                 └──────────────── summary cache ◀─────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatsum::cache::{MemoryCache, SummaryCache};
//! use chatsum::config::Config;
//! use chatsum::engine::SummarizationEngine;
//! use chatsum::llm::LlmClient;
//! use chatsum::models::SummaryOptions;
//!
//! # async fn run(messages: Vec<chatsum::models::Message>) -> chatsum::error::Result<()> {
//! let config = Config::default();
//! let client = Arc::new(LlmClient::new(&config.llm)?);
//! let backend = Arc::new(MemoryCache::new(
//!     config.cache.max_size,
//!     config.cache.default_ttl,
//! )?);
//! let cache = Arc::new(SummaryCache::new(backend, config.cache.default_ttl));
//! let engine = SummarizationEngine::new(client, Some(cache), &config.engine);
//!
//! let summary = engine
//!     .summarize(&messages, &SummaryOptions::default(), None, "channel-1", "guild-1")
//!     .await?;
//! println!("{}", summary.summary_text);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod models;
pub mod optimizer;
pub mod parser;
pub mod prompt;
pub mod utils;

// Re-export commonly used types
pub use engine::{HealthReport, HealthStatus, SummarizationEngine, SummarizeRequest};
pub use error::{ErrorCode, Result, SummaryError};
pub use models::{SummaryOptions, SummaryResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
