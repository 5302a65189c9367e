//! Two-tier cache orchestration.
//!
//! Reads go L1 then L2; an L2 hit is copied back into L1 with a short TTL.
//! Writes go to both tiers, L2 keeping entries `l2_ttl_multiplier` times
//! longer. Tier failures are logged and turned into misses or no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use finrelay_market_data::{DataResponse, Query};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::cache_key::CacheKey;
use super::cache_traits::PersistentCache;
use super::l1_cache::L1Cache;
use crate::config::CacheConfig;

/// Snapshot of cache activity counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub backfills: u64,
    pub writes: u64,
    pub l2_errors: u64,
    pub l1_entries: usize,
    pub l1_capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups answered by either tier.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.l1_hits + self.l1_misses;
        if lookups == 0 {
            return 0.0;
        }
        (self.l1_hits + self.l2_hits) as f64 / lookups as f64
    }
}

#[derive(Default)]
struct Counters {
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    backfills: AtomicU64,
    writes: AtomicU64,
    l2_errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// L1 + optional L2 cache for data responses.
pub struct MultiLevelCache {
    l1: L1Cache<DataResponse>,
    l2: Option<Arc<dyn PersistentCache>>,
    config: CacheConfig,
    counters: Counters,
}

impl MultiLevelCache {
    pub fn new(config: CacheConfig, l2: Arc<dyn PersistentCache>) -> Self {
        Self::build(config, Some(l2))
    }

    /// A cache without a persistent tier.
    pub fn memory_only(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    fn build(config: CacheConfig, l2: Option<Arc<dyn PersistentCache>>) -> Self {
        Self {
            l1: L1Cache::new(config.l1_capacity),
            l2,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn has_persistent_tier(&self) -> bool {
        self.l2.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<DataResponse> {
        if let Some(mut response) = self.l1.get(key) {
            bump(&self.counters.l1_hits);
            response.metadata.cache_hit = true;
            return Some(response);
        }
        bump(&self.counters.l1_misses);

        let l2 = self.l2.as_ref()?;
        match l2.get(key).await {
            Ok(Some(mut response)) => {
                bump(&self.counters.l2_hits);
                self.l1
                    .set(key, response.clone(), Some(self.config.l1_backfill_ttl));
                bump(&self.counters.backfills);
                debug!("L2 hit for {}, backfilled L1", key);
                response.metadata.cache_hit = true;
                Some(response)
            }
            Ok(None) => {
                bump(&self.counters.l2_misses);
                None
            }
            Err(e) => {
                bump(&self.counters.l2_errors);
                warn!("L2 read failed for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &DataResponse, ttl: Option<Duration>) {
        self.l1.set(key, value.clone(), ttl);
        bump(&self.counters.writes);

        if let Some(l2) = &self.l2 {
            let l2_ttl = ttl.map(|ttl| ttl.saturating_mul(self.config.l2_ttl_multiplier));
            if let Err(e) = l2.set(key, value, l2_ttl).await {
                bump(&self.counters.l2_errors);
                warn!("L2 write failed for {}: {}", key, e);
            }
        }
    }

    pub async fn get_data(&self, query: &Query) -> Option<DataResponse> {
        self.get(&CacheKey::derive(query).key).await
    }

    /// Caches `response` under the query's key and TTL class.
    pub async fn set_data(&self, query: &Query, response: &DataResponse) {
        let key = CacheKey::derive(query);
        self.set(&key.key, response, Some(key.ttl())).await;
    }

    /// L1 check without touching its LRU order, then L2.
    pub async fn exists(&self, key: &str) -> bool {
        if self.l1.contains(key) {
            return true;
        }
        match &self.l2 {
            Some(l2) => l2.exists(key).await.unwrap_or_else(|e| {
                bump(&self.counters.l2_errors);
                warn!("L2 exists check failed for {}: {}", key, e);
                false
            }),
            None => false,
        }
    }

    /// Removes `key` from both tiers. Returns true if either held it.
    pub async fn delete(&self, key: &str) -> bool {
        let in_l1 = self.l1.delete(key);
        let in_l2 = match &self.l2 {
            Some(l2) => l2.delete(key).await.unwrap_or_else(|e| {
                bump(&self.counters.l2_errors);
                warn!("L2 delete failed for {}: {}", key, e);
                false
            }),
            None => false,
        };
        in_l1 || in_l2
    }

    pub async fn clear(&self) {
        self.l1.clear();
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.clear().await {
                bump(&self.counters.l2_errors);
                warn!("L2 clear failed: {}", e);
            }
        }
    }

    /// True when the persistent tier answers. A memory-only cache is always
    /// reachable.
    pub async fn ping(&self) -> bool {
        match &self.l2 {
            Some(l2) => match l2.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("L2 ping failed: {}", e);
                    false
                }
            },
            None => true,
        }
    }

    /// Drops expired rows from the persistent tier.
    pub async fn purge_expired(&self) -> usize {
        let Some(l2) = &self.l2 else {
            return 0;
        };
        match l2.purge_expired().await {
            Ok(purged) => {
                debug!("Purged {} expired L2 entries", purged);
                purged
            }
            Err(e) => {
                bump(&self.counters.l2_errors);
                warn!("L2 purge failed: {}", e);
                0
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            l1_hits: load(&self.counters.l1_hits),
            l1_misses: load(&self.counters.l1_misses),
            l2_hits: load(&self.counters.l2_hits),
            l2_misses: load(&self.counters.l2_misses),
            backfills: load(&self.counters.backfills),
            writes: load(&self.counters.writes),
            l2_errors: load(&self.counters.l2_errors),
            l1_entries: self.l1.len(),
            l1_capacity: self.l1.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{sample_query, sample_response, FailingCache, MemoryCache};

    fn config() -> CacheConfig {
        CacheConfig {
            l1_capacity: 8,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_l1_hit_sets_flag() {
        let l2 = Arc::new(MemoryCache::default());
        let cache = MultiLevelCache::new(config(), l2.clone());
        let response = sample_response();

        cache.set("k", &response, Some(Duration::from_secs(60))).await;
        let hit = cache.get("k").await.unwrap();

        assert!(hit.metadata.cache_hit);
        assert_eq!(hit.data, response.data);
        assert_eq!(cache.stats().l1_hits, 1);
        assert_eq!(l2.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_l2_ttl_is_multiplied() {
        let l2 = Arc::new(MemoryCache::default());
        let cache = MultiLevelCache::new(config(), l2.clone());

        cache
            .set("k", &sample_response(), Some(Duration::from_secs(60)))
            .await;
        assert_eq!(l2.ttl_of("k"), Some(Some(Duration::from_secs(600))));

        cache.set("forever", &sample_response(), None).await;
        assert_eq!(l2.ttl_of("forever"), Some(None));
    }

    #[tokio::test]
    async fn test_backfill_from_l2() {
        let l2 = Arc::new(MemoryCache::default());
        let cache = MultiLevelCache::new(config(), l2.clone());
        let response = sample_response();
        l2.insert("k", &response);

        let first = cache.get("k").await.unwrap();
        assert!(first.metadata.cache_hit);
        assert_eq!(l2.get_calls(), 1);

        // Served from L1 now
        let second = cache.get("k").await.unwrap();
        assert_eq!(second.data, response.data);
        assert_eq!(l2.get_calls(), 1);

        let stats = cache.stats();
        assert_eq!(stats.l2_hits, 1);
        assert_eq!(stats.backfills, 1);
        assert_eq!(stats.l1_hits, 1);
    }

    #[tokio::test]
    async fn test_miss_in_both_tiers() {
        let l2 = Arc::new(MemoryCache::default());
        let cache = MultiLevelCache::new(config(), l2);
        assert!(cache.get("missing").await.is_none());
        assert!(!cache.exists("missing").await);
        assert_eq!(cache.stats().l2_misses, 1);
    }

    #[tokio::test]
    async fn test_l2_failures_degrade_to_miss() {
        let cache = MultiLevelCache::new(config(), Arc::new(FailingCache));

        cache
            .set("k", &sample_response(), Some(Duration::from_secs(5)))
            .await;
        // L1 still took the write
        assert!(cache.get("k").await.is_some());
        assert!(cache.get("other").await.is_none());
        assert!(!cache.exists("other").await);
        assert!(!cache.ping().await);
        assert!(cache.stats().l2_errors >= 3);
    }

    #[tokio::test]
    async fn test_query_level_round_trip() {
        let l2 = Arc::new(MemoryCache::default());
        let cache = MultiLevelCache::new(config(), l2.clone());
        let query = sample_query();

        cache.set_data(&query, &sample_response()).await;
        let key = CacheKey::derive(&query);
        assert!(cache.exists(&key.key).await);
        assert_eq!(
            l2.ttl_of(&key.key),
            Some(Some(Duration::from_secs(3600 * 10)))
        );
        assert!(cache.get_data(&query).await.is_some());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let l2 = Arc::new(MemoryCache::default());
        let cache = MultiLevelCache::new(config(), l2.clone());
        cache.set("a", &sample_response(), None).await;
        cache.set("b", &sample_response(), None).await;

        assert!(cache.delete("a").await);
        assert!(!cache.exists("a").await);
        assert!(!cache.delete("a").await);

        cache.clear().await;
        assert!(!cache.exists("b").await);
        assert_eq!(l2.len(), 0);
    }

    #[tokio::test]
    async fn test_memory_only_cache() {
        let cache = MultiLevelCache::memory_only(config());
        assert!(!cache.has_persistent_tier());
        assert!(cache.ping().await);

        cache.set("k", &sample_response(), None).await;
        assert!(cache.get("k").await.is_some());
        assert!(cache.get("nope").await.is_none());
        assert_eq!(cache.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_l1_still_serves_from_l2() {
        let l2 = Arc::new(MemoryCache::default());
        let cache = MultiLevelCache::new(
            CacheConfig {
                l1_capacity: 0,
                ..CacheConfig::default()
            },
            l2.clone(),
        );
        cache.set("k", &sample_response(), None).await;

        assert!(cache.get("k").await.is_some());
        assert!(cache.get("k").await.is_some());
        assert_eq!(l2.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_huge_ttls_do_not_overflow() {
        let l2 = Arc::new(MemoryCache::default());
        let cache = MultiLevelCache::new(
            CacheConfig {
                l1_backfill_ttl: Duration::MAX,
                ..config()
            },
            l2.clone(),
        );

        cache.set("k", &sample_response(), Some(Duration::MAX)).await;
        assert!(cache.get("k").await.is_some());
        assert_eq!(l2.ttl_of("k"), Some(Some(Duration::MAX)));

        l2.insert("cold", &sample_response());
        assert!(cache.get("cold").await.is_some());
        assert_eq!(cache.stats().backfills, 1);
    }
}
