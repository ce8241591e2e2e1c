//! Bounded in-process response cache backed by moka

use super::{CacheError, CacheKey, CachedResponse, ResponseCache};
use crate::domain::MAX_CACHE_TTL_SECONDS;
use async_trait::async_trait;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct Slot {
    response: CachedResponse,
    ttl: Duration,
}

/// Each entry lives for the TTL it was written with. A replacement restarts
/// the clock.
struct PerEntryTtl;

impl Expiry<CacheKey, Slot> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        slot: &Slot,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        slot: &Slot,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }
}

/// TTL cache with a fixed capacity. At capacity the least recently used
/// entry is evicted.
#[derive(Clone)]
pub struct InMemoryResponseCache {
    cache: Cache<CacheKey, Slot>,
    capacity: usize,
}

impl std::fmt::Debug for InMemoryResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryResponseCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl InMemoryResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let cache = Cache::builder()
            .max_capacity(capacity as u64)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .build();

        Self { cache, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live entries, after pending evictions and expirations are applied
    pub async fn len(&self) -> usize {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count() as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self.cache.get(key).await.map(|slot| slot.response))
    }

    async fn put(
        &self,
        key: CacheKey,
        entry: CachedResponse,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Ok(());
        }

        let ttl = ttl.min(Duration::from_secs(MAX_CACHE_TTL_SECONDS));
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Caching response");
        self.cache.insert(key, Slot { response: entry, ttl }).await;
        Ok(())
    }

    async fn entry_count(&self) -> Option<usize> {
        Some(self.len().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn key(s: &str) -> CacheKey {
        CacheKey(s.to_string())
    }

    fn response(body: &'static str) -> CachedResponse {
        let headers = vec![("content-type".to_string(), "application/json".to_string())];
        CachedResponse::new(200, headers, Bytes::from(body))
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = InMemoryResponseCache::new(10);
        cache.put(key("a"), response("one"), Duration::from_secs(60)).await.unwrap();

        let hit = cache.get(&key("a")).await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, Bytes::from("one"));
        assert!(cache.get(&key("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryResponseCache::new(10);
        cache.put(key("a"), response("one"), Duration::from_millis(50)).await.unwrap();
        assert!(cache.get(&key("a")).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get(&key("a")).await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_entries_keep_their_own_ttl() {
        let cache = InMemoryResponseCache::new(10);
        cache.put(key("short"), response("s"), Duration::from_millis(30)).await.unwrap();
        cache.put(key("long"), response("l"), Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cache.get(&key("short")).await.unwrap().is_none());
        assert!(cache.get(&key("long")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_keeps_single_entry() {
        let cache = InMemoryResponseCache::new(10);
        cache.put(key("a"), response("one"), Duration::from_secs(60)).await.unwrap();
        cache.put(key("a"), response("two"), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&key("a")).await.unwrap().unwrap().body, Bytes::from("two"));
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache = InMemoryResponseCache::new(2);
        for name in ["a", "b", "c", "d"] {
            cache.put(key(name), response("x"), Duration::from_secs(60)).await.unwrap();
            cache.len().await;
        }

        assert!(cache.len().await <= 2);
        assert!(cache.get(&key("d")).await.unwrap().is_some());
        assert!(cache.get(&key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_huge_ttl_is_clamped() {
        let cache = InMemoryResponseCache::new(2);
        cache.put(key("a"), response("a"), Duration::from_secs(u64::MAX)).await.unwrap();
        assert!(cache.get(&key("a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_stored() {
        let cache = InMemoryResponseCache::new(2);
        cache.put(key("a"), response("a"), Duration::ZERO).await.unwrap();
        assert!(cache.is_empty().await);
        assert_eq!(cache.entry_count().await, Some(0));
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = InMemoryResponseCache::new(4);
        cache.put(key("a"), response("a"), Duration::from_secs(60)).await.unwrap();
        cache.clear().await;
        assert!(cache.get(&key("a")).await.unwrap().is_none());
    }
}
