//! In-memory LRU tier.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::warn;
use lru::LruCache;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Bounded, thread-safe LRU cache with lazy per-entry expiry.
///
/// One mutex covers every read-check-evict-promote sequence. Entries set
/// without a TTL never expire. A capacity of 0 stores nothing.
pub struct L1Cache<V> {
    inner: Option<Mutex<LruCache<String, Entry<V>>>>,
    capacity: usize,
}

impl<V: Clone> L1Cache<V> {
    pub fn new(capacity: usize) -> Self {
        let inner = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { inner, capacity }
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<String, Entry<V>>>> {
        self.inner.as_ref().map(|inner| {
            inner.lock().unwrap_or_else(|poisoned| {
                warn!("L1 cache mutex was poisoned, recovering");
                poisoned.into_inner()
            })
        })
    }

    /// Returns a clone of the value and marks it most recently used.
    /// Expired entries are evicted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut cache = self.lock()?;
        let now = Instant::now();
        let expired = match cache.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        None
    }

    /// Inserts or replaces `key`, evicting the least recently used entry
    /// when the cache is full. A TTL too large to represent never expires.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let Some(mut cache) = self.lock() else {
            return;
        };
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        cache.put(key.into(), Entry { value, expires_at });
    }

    /// Presence check that leaves the LRU order untouched.
    pub fn contains(&self, key: &str) -> bool {
        let Some(mut cache) = self.lock() else {
            return false;
        };
        let expired = match cache.peek(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => return false,
        };
        if expired {
            cache.pop(key);
        }
        !expired
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().is_some_and(|mut cache| cache.pop(key).is_some())
    }

    pub fn clear(&self) {
        if let Some(mut cache) = self.lock() {
            cache.clear();
        }
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
