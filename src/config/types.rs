//! Configuration types, defaults, loading, and validation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// LLM client configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Engine behaviour configuration
    #[serde(default)]
    pub engine: EngineSettings,
}

/// LLM client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API credential; injected, never logged
    #[serde(default)]
    pub api_key: String,

    /// Completion endpoint (default: Anthropic messages API)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout in seconds (default: 120)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry budget for transient failures (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum interval between outbound requests in milliseconds
    /// (default: 100)
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

fn default_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_request_interval_ms() -> u64 {
    100
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            min_request_interval_ms: default_min_request_interval_ms(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backend selector: "memory" is the only in-tree implementation
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    /// Entry cap (default: 1000)
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Default TTL in seconds (default: 3600)
    #[serde(default = "default_cache_ttl")]
    pub default_ttl: i64,
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_cache_max_size() -> usize {
    1000
}

fn default_cache_ttl() -> i64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            max_size: default_cache_max_size(),
            default_ttl: default_cache_ttl(),
        }
    }
}

/// Engine behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Prompt size ceiling in estimated tokens (default: 100 000)
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,

    /// Bounded parallelism for batch summarization (default: 3)
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

fn default_max_prompt_tokens() -> usize {
    100_000
}

fn default_batch_concurrency() -> usize {
    3
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_prompt_tokens: default_max_prompt_tokens(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_size == 0 {
            anyhow::bail!("cache.max_size must be positive");
        }
        if self.cache.backend != "memory" {
            anyhow::bail!(
                "unsupported cache backend '{}': only 'memory' is available",
                self.cache.backend
            );
        }
        if self.engine.batch_concurrency == 0 {
            anyhow::bail!("engine.batch_concurrency must be positive");
        }
        if self.engine.max_prompt_tokens == 0 {
            anyhow::bail!("engine.max_prompt_tokens must be positive");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be positive");
        }
        Ok(())
    }
}
