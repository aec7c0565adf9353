//! # Read-Through Policy
//!
//! Turns a loosely-typed cached value into a usable domain object, or reports a miss.
//!
//! A cached value is returned to the caller only when it decodes into the target type AND
//! passes that type's [`CacheValidity`] check. Anything else (backend error, absent key,
//! undecodable JSON, placeholder entry with empty identity fields) falls through to the
//! network. Nothing is written back.

use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::entity_cache::EntityCache;
use super::keys::CacheKey;
use crate::core::types::RequestContext;

/// Whether a decoded cache value is complete enough to be served
pub trait CacheValidity {
    fn is_usable(&self) -> bool;
}

/// Decode a cached JSON value into `T`, keeping it only if it is usable
pub fn decode_cached<T>(value: Value) -> Option<T>
where
    T: DeserializeOwned + CacheValidity,
{
    serde_json::from_value::<T>(value)
        .ok()
        .filter(CacheValidity::is_usable)
}

/// Consult the cache for `key`, returning a usable value or `None`
///
/// Cache failures are logged and treated as misses. Cancelling the request context
/// abandons the lookup.
pub async fn read_through<T>(cache: &dyn EntityCache, ctx: &RequestContext, key: CacheKey) -> Option<T>
where
    T: DeserializeOwned + CacheValidity,
{
    let kind = key.kind();
    let lookup = tokio::select! {
        biased;
        _ = ctx.cancellation().cancelled() => {
            debug!(key = %key, "Cache lookup cancelled");
            return None;
        }
        result = cache.lookup(&key) => result,
    };

    let outcome = match lookup {
        Err(e) => {
            warn!(key = %key, error = %e, "Cache lookup failed, falling back to network");
            counter!("gateway_cache_lookups_total", "kind" => kind, "result" => "error").increment(1);
            return None;
        }
        Ok(None) => {
            counter!("gateway_cache_lookups_total", "kind" => kind, "result" => "miss").increment(1);
            return None;
        }
        Ok(Some(value)) => decode_cached::<T>(value),
    };

    match outcome {
        Some(value) => {
            debug!(key = %key, "Cache hit");
            counter!("gateway_cache_lookups_total", "kind" => kind, "result" => "hit").increment(1);
            Some(value)
        }
        None => {
            debug!(key = %key, "Cached entry unusable, falling back to network");
            counter!("gateway_cache_lookups_total", "kind" => kind, "result" => "invalid").increment(1);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheError, CacheResult, KeyedEntityCache, InMemoryCache};
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    }

    impl CacheValidity for Named {
        fn is_usable(&self) -> bool {
            !self.id.is_empty() && !self.name.is_empty()
        }
    }

    struct FailingCache;

    #[async_trait]
    impl EntityCache for FailingCache {
        async fn lookup(&self, _key: &CacheKey) -> CacheResult<Option<Value>> {
            Err(CacheError::Unavailable)
        }

        async fn put(&self, _key: &CacheKey, _value: &Value) -> CacheResult<()> {
            Err(CacheError::Unavailable)
        }
    }

    #[test]
    fn test_decode_requires_identity_fields() {
        let full: Option<Named> = decode_cached(json!({"id": "T1", "name": "Alice"}));
        assert_eq!(full, Some(Named { id: "T1".into(), name: "Alice".into() }));

        let nameless: Option<Named> = decode_cached(json!({"id": "T1"}));
        assert!(nameless.is_none());

        let wrong_shape: Option<Named> = decode_cached(json!(["T1"]));
        assert!(wrong_shape.is_none());
    }

    #[tokio::test]
    async fn test_cache_errors_become_misses() {
        let ctx = RequestContext::new();
        let result: Option<Named> = read_through(&FailingCache, &ctx, CacheKey::Teacher("T1".into())).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_lookup() {
        let cache = KeyedEntityCache::new(Arc::new(InMemoryCache::new(10)), Duration::from_secs(60));
        cache
            .put(&CacheKey::Teacher("T1".into()), &json!({"id": "T1", "name": "Alice"}))
            .await
            .unwrap();

        let ctx = RequestContext::new();
        ctx.cancellation().cancel();
        let result: Option<Named> = read_through(&cache, &ctx, CacheKey::Teacher("T1".into())).await;
        assert!(result.is_none());
    }
}
