//! In-memory response cache keyed by the literal inbound path.
//!
//! Expiry is lazy: a stale entry stays in the map (and in [`CacheStats`]) until
//! the next successful fetch for the same key overwrites it, but it is never
//! returned from a lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::CacheSettings;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub content_type: String,
    pub inserted_at: Instant,
}

impl CacheEntry {
    pub fn new(payload: Bytes, content_type: impl Into<String>) -> Self {
        Self::inserted_at(payload, content_type, Instant::now())
    }

    pub fn inserted_at(payload: Bytes, content_type: impl Into<String>, at: Instant) -> Self {
        Self {
            payload,
            content_type: content_type.into(),
            inserted_at: at,
        }
    }

    /// Usable while `now - inserted_at < ttl`.
    pub fn is_fresh_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) < ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub count: usize,
    pub total_bytes: u64,
}

/// Shared response cache. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh entry for `key`, or `None` when absent, stale or caching is disabled.
    pub fn get(&self, key: &str, settings: &CacheSettings) -> Option<CacheEntry> {
        self.get_at(key, settings, Instant::now())
    }

    pub fn get_at(&self, key: &str, settings: &CacheSettings, now: Instant) -> Option<CacheEntry> {
        if !settings.enabled {
            return None;
        }
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_fresh_at(now, settings.ttl) {
            Some(entry.clone())
        } else {
            debug!(key, "cache entry expired");
            None
        }
    }

    /// Store `entry` under `key`. Last write wins; no-op when caching is disabled.
    pub fn put(&self, key: &str, entry: CacheEntry, settings: &CacheSettings) {
        if !settings.enabled {
            return;
        }
        self.entries.write().insert(key.to_string(), entry);
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Count and payload bytes of every held entry, stale ones included.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        CacheStats {
            count: entries.len(),
            total_bytes: entries.values().map(|e| e.payload.len() as u64).sum(),
        }
    }
}
