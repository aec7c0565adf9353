//! # Entity Cache
//!
//! The externally-populated cache the facades read from. Values are loosely typed JSON;
//! turning them into domain types is the read-through policy's job.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::keys::CacheKey;
use super::stores::{CacheStore, InMemoryCache, RedisCache};
use super::CacheResult;
use crate::core::config::{CacheBackendKind, CacheConfig};
use crate::core::error::{GatewayError, GatewayResult};

/// Per-entity cache getters plus the writer side
///
/// Facades only read. `put` exists for whichever component populates the cache.
#[async_trait]
pub trait EntityCache: Send + Sync {
    /// Raw lookup by key
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<Value>>;

    /// Store `value` under `key`
    async fn put(&self, key: &CacheKey, value: &Value) -> CacheResult<()>;

    async fn get_teacher(&self, teacher_id: &str) -> CacheResult<Option<Value>> {
        self.lookup(&CacheKey::Teacher(teacher_id.to_string())).await
    }

    async fn get_student(&self, student_id: &str) -> CacheResult<Option<Value>> {
        self.lookup(&CacheKey::Student(student_id.to_string())).await
    }

    async fn get_teacher_by_user_and_org(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> CacheResult<Option<Value>> {
        self.lookup(&CacheKey::TeacherByUserAndOrg {
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
        })
        .await
    }

    async fn get_staff_by_user_and_org(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> CacheResult<Option<Value>> {
        self.lookup(&CacheKey::StaffByUserAndOrg {
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
        })
        .await
    }

    async fn get_user_by_teacher(&self, teacher_id: &str) -> CacheResult<Option<Value>> {
        self.lookup(&CacheKey::UserByTeacher(teacher_id.to_string())).await
    }

    async fn get_parent_by_user(&self, user_id: &str) -> CacheResult<Option<Value>> {
        self.lookup(&CacheKey::ParentByUser(user_id.to_string())).await
    }
}

/// Entity cache over a byte-level [`CacheStore`]
pub struct KeyedEntityCache {
    store: Arc<dyn CacheStore>,
    entry_ttl: Duration,
}

impl KeyedEntityCache {
    pub fn new(store: Arc<dyn CacheStore>, entry_ttl: Duration) -> Self {
        Self { store, entry_ttl }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }
}

#[async_trait]
impl EntityCache for KeyedEntityCache {
    async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<Value>> {
        match self.store.get(&key.to_string()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, value: &Value) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(&key.to_string(), &bytes, self.entry_ttl).await
    }
}

/// Cache that never holds anything; every lookup is a miss
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEntityCache;

#[async_trait]
impl EntityCache for DisabledEntityCache {
    async fn lookup(&self, _key: &CacheKey) -> CacheResult<Option<Value>> {
        Ok(None)
    }

    async fn put(&self, _key: &CacheKey, _value: &Value) -> CacheResult<()> {
        Ok(())
    }
}

/// Build the entity cache selected by `config`
///
/// A store that fails its health check is an error; callers fall back to [`DisabledEntityCache`].
pub async fn build_entity_cache(config: &CacheConfig) -> GatewayResult<Arc<dyn EntityCache>> {
    let cache: Arc<dyn EntityCache> = match config.backend {
        CacheBackendKind::Memory => {
            // Only writers inside this process can fill it
            warn!("Entity cache is process-local; lookups miss unless this process populates it");
            let store = verified_store(Arc::new(InMemoryCache::new(config.max_entries))).await?;
            Arc::new(KeyedEntityCache::new(store, config.entry_ttl))
        }
        CacheBackendKind::Redis => {
            let store = verified_store(Arc::new(RedisCache::connect(&config.redis).await?)).await?;
            Arc::new(KeyedEntityCache::new(store, config.entry_ttl))
        }
        CacheBackendKind::Disabled => Arc::new(DisabledEntityCache),
    };

    info!(backend = ?config.backend, entry_ttl = ?config.entry_ttl, "Entity cache ready");
    Ok(cache)
}

async fn verified_store(store: Arc<dyn CacheStore>) -> GatewayResult<Arc<dyn CacheStore>> {
    if !store.health_check().await? {
        return Err(GatewayError::Cache {
            message: format!("{} store failed its health check", store.name()),
        });
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_then_get_by_kind() {
        let cache = KeyedEntityCache::new(Arc::new(InMemoryCache::new(10)), Duration::from_secs(60));
        cache
            .put(
                &CacheKey::TeacherByUserAndOrg {
                    user_id: "U1".into(),
                    organization_id: "O1".into(),
                },
                &json!({"id": "T1", "name": "Alice"}),
            )
            .await
            .unwrap();

        let hit = cache.get_teacher_by_user_and_org("U1", "O1").await.unwrap();
        assert_eq!(hit, Some(json!({"id": "T1", "name": "Alice"})));
        assert_eq!(cache.get_teacher("T1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let store = Arc::new(InMemoryCache::new(10));
        store.set("student:S1", b"not json", Duration::from_secs(60)).await.unwrap();
        let cache = KeyedEntityCache::new(store, Duration::from_secs(60));

        assert!(cache.get_student("S1").await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let cache = DisabledEntityCache;
        cache.put(&CacheKey::Teacher("T1".into()), &json!({"id": "T1"})).await.unwrap();
        assert_eq!(cache.get_teacher("T1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_build_memory_cache_from_config() {
        let config = CacheConfig {
            backend: CacheBackendKind::Memory,
            ..CacheConfig::default()
        };
        let cache = build_entity_cache(&config).await.unwrap();
        cache.put(&CacheKey::Student("S1".into()), &json!({"id": "S1"})).await.unwrap();
        assert!(cache.get_student("S1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_default_config_builds_disabled_cache() {
        let cache = build_entity_cache(&CacheConfig::default()).await.unwrap();
        cache.put(&CacheKey::Student("S1".into()), &json!({"id": "S1"})).await.unwrap();
        assert_eq!(cache.get_student("S1").await.unwrap(), None);
    }

    /// Store whose health check reports a bad reply
    struct UnhealthyStore;

    #[async_trait]
    impl CacheStore for UnhealthyStore {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Ok(false)
        }

        async fn health_check(&self) -> CacheResult<bool> {
            Ok(false)
        }

        fn name(&self) -> &'static str {
            "unhealthy"
        }
    }

    #[tokio::test]
    async fn test_unhealthy_store_is_rejected() {
        let err = verified_store(Arc::new(UnhealthyStore)).await.err().unwrap();
        assert!(matches!(err, GatewayError::Cache { .. }));
        assert!(err.to_string().contains("unhealthy store failed its health check"));

        assert!(verified_store(Arc::new(InMemoryCache::new(1))).await.is_ok());
    }
}
