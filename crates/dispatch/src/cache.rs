//! TTL cache for resources tools fetch repeatedly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
    hits: u64,
    last_access: Instant,
}

/// Shared cache keyed by URI, injected into tools via `ToolContext`.
///
/// Entries expire after a TTL; an expired entry is never returned and
/// counts as a miss. Created alongside the server and cleared when it
/// shuts down.
pub struct ResourceCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time counters, serialized into health output.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ResourceCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look a value up. Expired entries are evicted on the spot and
    /// reported as misses.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.hits += 1;
                entry.last_access = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value under the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Store a value with an explicit TTL, replacing any previous entry.
    pub fn insert_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
            hits: 0,
            last_access: now,
        };
        self.entries.write().unwrap().insert(key.into(), entry);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().unwrap().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}
