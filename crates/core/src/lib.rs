//! Finrelay Core - caching and request orchestration.
//!
//! This crate contains the multi-level response cache and the data service
//! that ties the cache to the provider router. It is database-agnostic and
//! defines the `PersistentCache` trait implemented by the `storage-sqlite`
//! crate.

pub mod cache;
pub mod config;
pub mod data;
pub mod errors;

pub use cache::{CacheKey, CacheStats, L1Cache, MultiLevelCache, PersistentCache};
pub use config::{CacheConfig, ServiceConfig};
pub use data::{DataService, DataServiceTrait, HealthStatus, ServiceHealth};

// Re-export error types
pub use errors::Error;
pub use errors::Result;
