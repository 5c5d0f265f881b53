//! LLM client: request shaping, pacing, retries, error mapping, and usage
//! accounting over an external text-completion API.

pub mod client;
pub mod registry;
pub mod transport;
pub mod types;

pub use client::LlmClient;
pub use registry::ModelPricing;
pub use types::{LlmOptions, LlmResponse, UsageStats};
