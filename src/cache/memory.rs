//! In-process cache backend
//!
//! DashMap keyed by the full cache key. Entries carry their own expiry and
//! are dropped lazily on read, or in bulk by [`MemoryCache::cleanup_expired`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use super::{CacheError, CacheStore};

struct CacheEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

/// Hit / miss counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Concurrent in-memory cache with per-entry TTL
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry; returns how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed = removed, "Cleaned up expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.data.clone()));
            }
        }

        // Re-checked under the shard lock so a concurrent set is never removed
        if self
            .entries
            .remove_if(key, |_, entry| Instant::now() >= entry.expires_at)
            .is_some()
        {
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry {
            data: value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Spawn a background task that periodically drops expired entries
pub fn spawn_cleanup_task(cache: Arc<MemoryCache>, interval: Duration) -> tokio::task::JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Cache cleanup task started");

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let expired = cache.cleanup_expired();
            let stats = cache.stats();
            debug!(
                expired = expired,
                entries = stats.entry_count,
                hit_rate = format!("{:.1}%", stats.hit_rate()),
                "Cache cleanup completed"
            );
        }
    })
}
