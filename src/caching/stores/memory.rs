//! # In-Memory Cache Store
//!
//! DashMap-backed store with TTL and a hard cap on the number of entries. Expired entries
//! are dropped lazily on read and swept before an eviction; when the store is still full
//! the entry closest to expiry is evicted.

use super::{CacheEntry, CacheStore, CacheStoreStats};
use crate::caching::CacheResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// In-memory cache implementation
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryCache {
    /// Create a store holding at most `max_entries` entries
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStoreStats {
        CacheStoreStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }

        let purged = self.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }

        while self.entries.len() >= self.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());

            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Evicted cache entry");
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        match value {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            None => {
                self.entries.remove_if(key, |_, entry| entry.is_expired());
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        if !self.entries.contains_key(key) {
            self.make_room();
        }
        self.entries
            .insert(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCache::new(10);
        cache.set("teacher:T1", b"alice", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("teacher:T1").await.unwrap(), Some(b"alice".to_vec()));
        assert_eq!(cache.get("teacher:T2").await.unwrap(), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_not_served() {
        let cache = InMemoryCache::new(10);
        cache.set("teacher:T1", b"alice", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("teacher:T1").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_soonest_expiry() {
        let cache = InMemoryCache::new(2);
        cache.set("a", b"1", Duration::from_secs(10)).await.unwrap();
        cache.set("b", b"2", Duration::from_secs(60)).await.unwrap();
        cache.set("c", b"3", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.get("b").await.unwrap().is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = InMemoryCache::new(1);
        cache.set("a", b"1", Duration::from_secs(60)).await.unwrap();
        cache.set("a", b"2", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = InMemoryCache::new(10);
        cache.set("a", b"1", Duration::from_secs(60)).await.unwrap();
        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.delete("a").await.unwrap());
    }
}
