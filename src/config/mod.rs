//! Configuration loading and validation.

mod types;

pub use types::{CacheConfig, Config, EngineSettings, LlmConfig};
