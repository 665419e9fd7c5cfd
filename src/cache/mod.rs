//! Cache stores for ranked feed pages and item stats
//!
//! Backends hold opaque bytes under string keys with a per-entry TTL.
//! `get` separates a miss (`Ok(None)`) from a backend failure (`Err`), so
//! callers can log failures without confusing them with cold keys.

pub mod feed_cache;
pub mod memory;

use std::time::Duration;

use thiserror::Error;

pub use feed_cache::FeedCache;
pub use memory::{CacheStats, MemoryCache};

/// Error types for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend could not be reached
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Stored payload could not be (de)serialized
    #[error("Cache payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed byte store with TTL
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store an entry that expires after `ttl`
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove an entry; absent keys are not an error
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Backend used when caching is turned off; every read misses
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

impl CacheStore for DisabledCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
