//! Typed, namespaced view over a [`CacheStore`]
//!
//! Values are stored as JSON. Any backend or payload failure is logged and
//! treated as a miss (on read) or skipped (on write); callers never see it.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{CacheError, CacheStore};
use crate::config::CacheConfig;

/// Feed page and item stats cache
#[derive(Clone)]
pub struct FeedCache {
    store: Arc<dyn CacheStore>,
    namespace: String,
    feed_ttl: Duration,
    stats_ttl: Duration,
}

impl FeedCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
            feed_ttl: config.feed_ttl(),
            stats_ttl: config.stats_ttl(),
        }
    }

    pub fn feed_ttl(&self) -> Duration {
        self.feed_ttl
    }

    pub fn stats_ttl(&self) -> Duration {
        self.stats_ttl
    }

    /// Key for one ranked page; tag order and repeats do not matter
    pub fn feed_key(&self, user_id: Option<i64>, page: i64, limit: i64, tags: &[String]) -> String {
        let user = user_id.map_or_else(|| "anon".to_string(), |id| id.to_string());

        let mut tags: Vec<&str> = tags.iter().map(String::as_str).collect();
        tags.sort_unstable();
        tags.dedup();

        format!("{}:feed:{}:{}:{}:{}", self.namespace, user, page, limit, tags.join(","))
    }

    pub fn stats_key(&self, item_id: i64) -> String {
        format!("{}:stats:{}", self.namespace, item_id)
    }

    /// Read and decode a cached value; failures degrade to a miss
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key) {
            Ok(Some(value)) => {
                debug!(key = key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key = key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cache read failed, recomputing");
                None
            }
        }
    }

    fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a value; failures are logged and dropped
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let result = serde_json::to_vec(value)
            .map_err(CacheError::from)
            .and_then(|bytes| self.store.set(key, bytes, ttl));

        if let Err(e) = result {
            warn!(key = key, error = %e, "Cache write failed");
        }
    }

    pub fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            warn!(key = key, error = %e, "Cache delete failed");
        }
    }
}
