//! # Caching Module
//!
//! Read-through lookups for the entity facades. The cache is consulted before the network
//! and is strictly best-effort: every failure here is logged and turned into a miss.
//!
//! ## Architecture
//! 1. **Cache Stores**: byte-level key/value stores with TTL (in-memory, Redis)
//! 2. **Keys**: one [`CacheKey`] variant per entity kind, rendered as `kind:<natural key>`
//! 3. **Entity Cache**: per-entity getters returning loosely-typed JSON values
//! 4. **Read-through policy**: decode a cached value into the target type and check that it
//!    is usable before returning it
//!
//! ## Usage Example
//! ```rust,ignore
//! let store = Arc::new(InMemoryCache::new(1_000));
//! let cache = KeyedEntityCache::new(store, Duration::from_secs(600));
//!
//! cache.put(&CacheKey::Teacher("T1".into()), &json!({"id": "T1", "name": "Alice"})).await?;
//! let cached = cache.get_teacher("T1").await?;
//! ```

pub mod entity_cache;
pub mod keys;
pub mod read_through;
pub mod stores;

pub use entity_cache::{build_entity_cache, DisabledEntityCache, EntityCache, KeyedEntityCache};
pub use keys::CacheKey;
pub use read_through::{decode_cached, read_through, CacheValidity};
pub use stores::{CacheEntry, CacheStore, CacheStoreStats, InMemoryCache, RedisCache};

use crate::core::error::GatewayError;

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache not available")]
    Unavailable,
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        GatewayError::Cache {
            message: err.to_string(),
        }
    }
}
