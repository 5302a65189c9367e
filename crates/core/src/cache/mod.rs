//! Multi-level response cache.
//!
//! - [`cache_key`] - Deterministic keys and TTL classes derived from a query
//! - [`l1_cache`] - Bounded in-memory LRU tier with lazy expiry
//! - [`cache_traits`] - Storage trait for the persistent (L2) tier
//! - [`multi_level`] - Read-through / write-through orchestration of both tiers
//!
//! ```text
//! MultiLevelCache ──> L1Cache (in-process, LRU)
//!        │
//!        └──────────> PersistentCache (storage-sqlite)
//! ```

pub mod cache_key;
pub mod cache_traits;
pub mod l1_cache;
pub mod multi_level;

#[cfg(test)]
pub(crate) mod testing;

pub use cache_key::{ttl_for_timeframe, CacheKey, DEFAULT_TTL_SECS};
pub use cache_traits::PersistentCache;
pub use l1_cache::L1Cache;
pub use multi_level::{CacheStats, MultiLevelCache};
