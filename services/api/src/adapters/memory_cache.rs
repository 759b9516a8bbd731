//! services/api/src/adapters/memory_cache.rs
//!
//! This module contains the in-process response cache, the concrete
//! implementation of the `ResponseCache` port backed by a moka future
//! cache. Each entry carries its own TTL; expiry is evaluated on read,
//! so a lost entry can only ever cost latency.

use async_trait::async_trait;
use book_discovery_core::ports::ResponseCache;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Clone)]
struct Entry {
    value: Value,
    ttl: Duration,
}

/// Reads the TTL stored inside each entry instead of applying one
/// cache-wide policy.
struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// An adapter that implements the `ResponseCache` port with a bounded
/// in-process moka cache.
#[derive(Clone)]
pub struct MokaResponseCache {
    inner: Cache<String, Entry>,
}

impl MokaResponseCache {
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryExpiry)
            .support_invalidation_closures()
            .build();
        Self { inner }
    }
}

#[async_trait]
impl ResponseCache for MokaResponseCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).await.map(|entry| entry.value)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.inner.insert(key.to_string(), Entry { value, ttl }).await;
    }

    async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.to_string();
        if let Err(error) = self
            .inner
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
        {
            warn!(%error, "cache prefix invalidation failed");
        }
    }

    async fn clear(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_and_overwrite() {
        let cache = MokaResponseCache::new(100);
        cache
            .set("k", json!({"v": 1}), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await, Some(json!({"v": 1})));

        cache
            .set("k", json!({"v": 2}), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await, Some(json!({"v": 2})));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn per_entry_ttl_expires_independently() {
        let cache = MokaResponseCache::new(100);
        cache.set("short", json!(1), Duration::from_millis(50)).await;
        cache.set("long", json!(2), Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.get("long").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn prefix_invalidation_and_clear() {
        let cache = MokaResponseCache::new(100);
        cache.set("search:a", json!(1), Duration::from_secs(60)).await;
        cache.set("search:b", json!(2), Duration::from_secs(60)).await;
        cache.set("detail:a", json!(3), Duration::from_secs(60)).await;

        cache.invalidate_prefix("search:").await;
        // Predicate-based invalidation is applied lazily on read.
        assert_eq!(cache.get("search:a").await, None);
        assert_eq!(cache.get("search:b").await, None);
        assert_eq!(cache.get("detail:a").await, Some(json!(3)));

        cache.clear().await;
        assert_eq!(cache.get("detail:a").await, None);
    }
}
