//! # Redis Cache Store
//!
//! Shared cache backed by Redis. Keys are namespaced with a configurable prefix so several
//! services can share one database. The connection manager reconnects on its own.

use super::CacheStore;
use crate::caching::{CacheError, CacheResult};
use crate::core::config::RedisConfig;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

/// Redis cache implementation
pub struct RedisCache {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    /// Connect to the Redis server described by `config`
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url())?;
        let connection = ConnectionManager::new(client).await?;

        info!(host = %config.host, port = config.port, db = config.db, "Redis cache connected");

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Get the full cache key with prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
        debug!(key = %key, hit = value.is_some(), "Redis cache lookup");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(self.full_key(key), value, seconds).await?;
        debug!(key = %key, ttl = ?ttl, "Redis cache write");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let deleted: i64 = conn.del(self.full_key(key)).await?;
        Ok(deleted > 0)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(pong == "PONG")
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
