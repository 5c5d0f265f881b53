//! TTL+LRU cache for authorization decisions.
//!
//! Distinct from the summary cache backend on purpose: eviction here is by
//! least-recent *access*, every hit advances the entry's recency, and
//! invalidation accepts `*` wildcard patterns instead of bare prefixes.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::{Result, SummaryError};

const DEFAULT_TTL_SECS: i64 = 3600;
const DEFAULT_MAX_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    access_count: u64,
    /// Monotonic recency stamp; advanced on every hit.
    last_access_tick: u64,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

/// Snapshot of permission-cache state and effectiveness.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PermissionCacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit percentage over all lookups, 0.0 when none have happened.
    pub hit_rate: f64,
    pub ttl: i64,
}

/// Detailed view of a single entry, for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PermissionEntryInfo {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

/// In-memory permission cache with TTL expiry and LRU eviction.
pub struct PermissionCache {
    inner: Mutex<Inner>,
    ttl: i64,
    max_size: usize,
}

impl PermissionCache {
    /// Create a cache with the given default TTL (seconds) and size cap.
    /// A zero cap is refused.
    pub fn new(ttl: i64, max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(SummaryError::InvalidOptions {
                reason: "permission cache max_size must be positive".to_string(),
            });
        }
        tracing::info!(ttl, max_size, "permission cache initialized");
        Ok(Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            max_size,
        })
    }

    /// Cache with the conventional defaults (1 h TTL, 10 000 entries).
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL_SECS, DEFAULT_MAX_SIZE).expect("defaults are valid")
    }

    /// Fetch a cached decision. A hit refreshes the entry's recency so it
    /// is not the next LRU victim; expired entries are removed and counted
    /// as misses.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().expect("permission cache lock poisoned");
        let now = Utc::now();

        let expired = inner.entries.get(key).is_some_and(|e| e.is_expired(now));
        if expired {
            inner.entries.remove(key);
            inner.misses += 1;
            tracing::debug!(key, "permission cache entry expired");
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.access_count += 1;
                entry.last_access_tick = tick;
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a decision. `ttl` overrides the cache default; `<= 0` means no
    /// expiry. Inserting a new key at capacity evicts the least recently
    /// accessed entry.
    pub fn set(&self, key: &str, value: Value, ttl: Option<i64>) {
        let mut inner = self.inner.lock().expect("permission cache lock poisoned");

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_size {
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access_tick)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&victim);
                tracing::debug!(evicted = %victim, "permission cache evicted LRU entry");
            }
        }

        let ttl_seconds = ttl.unwrap_or(self.ttl);
        let now = Utc::now();
        let expires_at = (ttl_seconds > 0).then(|| now + Duration::seconds(ttl_seconds));

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: now,
                expires_at,
                access_count: 0,
                last_access_tick: tick,
            },
        );
    }

    /// Remove one key. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().expect("permission cache lock poisoned");
        inner.entries.remove(key).is_some()
    }

    /// Remove every entry whose key matches `pattern`, where `*` matches
    /// any run of characters (e.g. `*:guild-42:*`). Returns entries removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let regex = match Self::compile_pattern(pattern) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(pattern, %err, "unusable invalidation pattern");
                return 0;
            }
        };

        let mut inner = self.inner.lock().expect("permission cache lock poisoned");
        let matching: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| regex.is_match(k))
            .cloned()
            .collect();
        for key in &matching {
            inner.entries.remove(key);
        }
        if !matching.is_empty() {
            tracing::info!(pattern, removed = matching.len(), "invalidated permission entries");
        }
        matching.len()
    }

    /// Remove everything.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock().expect("permission cache lock poisoned");
        let count = inner.entries.len();
        inner.entries.clear();
        tracing::info!(count, "permission cache cleared");
        count
    }

    /// Explicit sweep of expired entries, distinct from lazy expiry on
    /// access. Returns entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().expect("permission cache lock poisoned");
        let now = Utc::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.entries.remove(key);
        }
        if !expired.is_empty() {
            tracing::info!(removed = expired.len(), "swept expired permission entries");
        }
        expired.len()
    }

    pub fn stats(&self) -> PermissionCacheStats {
        let inner = self.inner.lock().expect("permission cache lock poisoned");
        let lookups = inner.hits + inner.misses;
        let hit_rate = if lookups > 0 {
            inner.hits as f64 / lookups as f64 * 100.0
        } else {
            0.0
        };
        PermissionCacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
            ttl: self.ttl,
        }
    }

    pub fn reset_stats(&self) {
        let mut inner = self.inner.lock().expect("permission cache lock poisoned");
        inner.hits = 0;
        inner.misses = 0;
    }

    /// Diagnostic view of one entry without touching its recency.
    pub fn entry_info(&self, key: &str) -> Option<PermissionEntryInfo> {
        let inner = self.inner.lock().expect("permission cache lock poisoned");
        inner.entries.get(key).map(|e| PermissionEntryInfo {
            key: key.to_string(),
            created_at: e.created_at,
            expires_at: e.expires_at,
            access_count: e.access_count,
        })
    }

    /// All live keys, optionally filtered by prefix.
    pub fn keys(&self, prefix: Option<&str>) -> Vec<String> {
        let inner = self.inner.lock().expect("permission cache lock poisoned");
        inner
            .entries
            .keys()
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("permission cache lock poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock().expect("permission cache lock poisoned");
        inner
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(Utc::now()))
    }

    /// Turn a `*`-wildcard pattern into an anchored regex, escaping every
    /// literal segment.
    fn compile_pattern(pattern: &str) -> std::result::Result<Regex, regex::Error> {
        let translated: String = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^{translated}$"))
    }
}
