//! Typed summary cache over a pluggable backend.
//!
//! Keys are the colon-joined tuple
//! `summary:<channel_id>:<start_hour>:<end_hour>:<options_fingerprint>`
//! with both range boundaries truncated to the hour (UTC, `YYYYMMDDHH`).
//! Hour truncation widens the hit window for near-identical requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::backend::{CacheBackend, MemoryCache};
use crate::config::CacheConfig;
use crate::error::{Result, SummaryError};
use crate::models::SummaryResult;

const KEY_NAMESPACE: &str = "summary";

/// Build a summary cache from configuration.
///
/// Only the in-memory backend exists in-tree; anything else is refused
/// explicitly rather than silently downgraded.
pub fn create_cache(config: &CacheConfig) -> Result<SummaryCache> {
    match config.backend.as_str() {
        "memory" => {
            let backend = Arc::new(MemoryCache::new(config.max_size, config.default_ttl)?);
            Ok(SummaryCache::new(backend, config.default_ttl))
        }
        other => Err(SummaryError::InvalidOptions {
            reason: format!("unsupported cache backend '{other}': supported backends: 'memory'"),
        }),
    }
}

/// Fingerprint-keyed memoization of finished summaries.
pub struct SummaryCache {
    backend: Arc<dyn CacheBackend>,
    default_ttl: i64,
}

impl std::fmt::Debug for SummaryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryCache")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl SummaryCache {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: i64) -> Self {
        Self {
            backend,
            default_ttl,
        }
    }

    /// Look up a cached summary for the given range and options fingerprint.
    ///
    /// A value that fails to deserialize is treated as a miss and removed so
    /// it cannot poison later lookups.
    pub async fn get_cached_summary(
        &self,
        channel_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        options_fingerprint: &str,
    ) -> Option<SummaryResult> {
        let key = Self::cache_key(channel_id, start_time, end_time, options_fingerprint);
        let value = self.backend.get(&key).await?;

        match serde_json::from_value::<SummaryResult>(value) {
            Ok(summary) => {
                tracing::debug!(%key, "summary cache hit");
                Some(summary)
            }
            Err(err) => {
                tracing::warn!(%key, %err, "removing undecodable cache entry");
                self.backend.delete(&key).await;
                None
            }
        }
    }

    /// Store a finished summary under its canonical key.
    pub async fn cache_summary(&self, summary: &SummaryResult, options_fingerprint: &str) -> bool {
        let key = Self::cache_key(
            &summary.channel_id,
            summary.start_time,
            summary.end_time,
            options_fingerprint,
        );
        let value = match serde_json::to_value(summary) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%key, %err, "failed to serialize summary for caching");
                return false;
            }
        };
        let stored = self.backend.set(&key, value, self.default_ttl).await;
        tracing::debug!(%key, stored, "summary cached");
        stored
    }

    /// Remove every cached summary for a channel. Returns entries removed.
    pub async fn invalidate_channel(&self, channel_id: &str) -> usize {
        let prefix = format!("{KEY_NAMESPACE}:{channel_id}:");
        let removed = self.backend.clear(Some(&prefix)).await;
        tracing::info!(channel_id, removed, "invalidated channel summaries");
        removed
    }

    /// Remove cached summaries for a guild.
    ///
    /// Keys do not embed the guild id, so this clears the whole summary
    /// namespace. Coarse, and accepted as such.
    pub async fn invalidate_guild(&self, guild_id: &str) -> usize {
        let prefix = format!("{KEY_NAMESPACE}:");
        let removed = self.backend.clear(Some(&prefix)).await;
        tracing::info!(guild_id, removed, "invalidated guild summaries (full sweep)");
        removed
    }

    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }

    /// Canonical cache key; deterministic across runs and processes.
    pub fn cache_key(
        channel_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        options_fingerprint: &str,
    ) -> String {
        format!(
            "{KEY_NAMESPACE}:{channel_id}:{}:{}:{options_fingerprint}",
            start_time.format("%Y%m%d%H"),
            end_time.format("%Y%m%d%H"),
        )
    }
}
