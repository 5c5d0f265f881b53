//! Cache backend abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::error::{Result, SummaryError};

/// Key→value store with per-entry TTL and a size cap.
///
/// The in-process implementation is [`MemoryCache`]; a Redis-style backend
/// can be swapped in behind the same trait, which is why every operation is
/// async and `health_check` exists at all.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns `None` for absent or expired keys. Expired entries are
    /// removed on access.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Stores a value. `ttl_seconds <= 0` means no expiry.
    async fn set(&self, key: &str, value: Value, ttl_seconds: i64) -> bool;

    /// Removes a key. Idempotent.
    async fn delete(&self, key: &str) -> bool;

    /// Removes all keys starting with `prefix`, or everything when `None`.
    /// Returns the number of entries removed.
    async fn clear(&self, prefix: Option<&str>) -> usize;

    /// Whether the backend is reachable.
    async fn health_check(&self) -> bool;
}

struct Entry {
    value: Value,
    /// Monotonic insertion order; refreshed on overwrite.
    inserted_seq: u64,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    seq: u64,
}

/// Snapshot of memory-cache occupancy.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MemoryCacheStats {
    pub size: usize,
    pub max_size: usize,
    pub expired_entries: usize,
}

/// In-memory cache backend.
///
/// When at capacity, inserting a new key evicts the entry that was written
/// longest ago. Overwriting an existing key never evicts. Expired entries
/// are cleaned lazily when read.
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_size: usize,
    default_ttl: i64,
}

impl MemoryCache {
    /// Create a backend holding at most `max_size` entries.
    ///
    /// `default_ttl` (seconds) applies when callers pass no explicit TTL via
    /// [`MemoryCache::set_default`]; `<= 0` disables expiry. A zero cap is
    /// refused.
    pub fn new(max_size: usize, default_ttl: i64) -> Result<Self> {
        if max_size == 0 {
            return Err(SummaryError::InvalidOptions {
                reason: "cache max_size must be positive".to_string(),
            });
        }
        Ok(Self {
            inner: Mutex::new(Inner::default()),
            max_size,
            default_ttl,
        })
    }

    /// Store with the backend's default TTL.
    pub async fn set_default(&self, key: &str, value: Value) -> bool {
        self.set(key, value, self.default_ttl).await
    }

    /// Occupancy snapshot, counting entries that have expired but not yet
    /// been swept by a read.
    pub fn stats(&self) -> MemoryCacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let now = Utc::now();
        let expired = inner
            .entries
            .values()
            .filter(|e| e.is_expired(now))
            .count();
        MemoryCacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            expired_entries: expired,
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let expired = inner
            .entries
            .get(key)
            .is_some_and(|e| e.is_expired(Utc::now()));
        if expired {
            inner.entries.remove(key);
            tracing::debug!(key, "cache entry expired on access");
            return None;
        }
        inner.entries.get(key).map(|e| e.value.clone())
    }

    async fn set(&self, key: &str, value: Value, ttl_seconds: i64) -> bool {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        // Eviction only applies when a brand-new key would push past the cap.
        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_size {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_seq)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
                tracing::debug!(evicted = %oldest, "cache at capacity, evicted oldest entry");
            }
        }

        let expires_at = if ttl_seconds > 0 {
            Some(Utc::now() + Duration::seconds(ttl_seconds))
        } else {
            None
        };

        inner.seq += 1;
        let seq = inner.seq;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_seq: seq,
                expires_at,
            },
        );
        true
    }

    async fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.remove(key).is_some()
    }

    async fn clear(&self, prefix: Option<&str>) -> usize {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        match prefix {
            None => {
                let count = inner.entries.len();
                inner.entries.clear();
                count
            }
            Some(prefix) => {
                let keys: Vec<String> = inner
                    .entries
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect();
                for key in &keys {
                    inner.entries.remove(key);
                }
                keys.len()
            }
        }
    }

    async fn health_check(&self) -> bool {
        true
    }
}
