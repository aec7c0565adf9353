//! # Cache Stores Module
//!
//! Byte-level key/value stores with per-entry TTL. The entity cache serializes JSON into them.

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryCache;
pub use redis_store::RedisCache;

use super::CacheResult;
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Cache entry with its expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value
    pub value: Vec<u8>,

    /// When the entry stops being served
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Check if the entry is expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Trait for cache store implementations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in the cache with TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete a value from the cache
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Perform health check
    async fn health_check(&self) -> CacheResult<bool>;

    /// Store name for logs
    fn name(&self) -> &'static str;
}

/// Cache store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStoreStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}
