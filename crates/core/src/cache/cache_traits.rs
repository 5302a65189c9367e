//! Persistent cache storage trait.
//!
//! This trait abstracts the durable (L2) tier so that different storage
//! backends can sit behind the multi-level cache. The SQLite implementation
//! lives in the `storage-sqlite` crate.

use std::time::Duration;

use async_trait::async_trait;
use finrelay_market_data::DataResponse;

use crate::errors::Result;

/// Storage interface for the persistent cache tier.
///
/// Entries outlive the process. Expired entries are never returned by
/// [`get`](Self::get) or counted by [`exists`](Self::exists), whether or not
/// they have been purged yet.
#[async_trait]
pub trait PersistentCache: Send + Sync {
    /// Returns the unexpired entry stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<DataResponse>>;

    /// Stores `response` under `key`, replacing any previous entry.
    ///
    /// `ttl = None` stores an entry that never expires.
    async fn set(&self, key: &str, response: &DataResponse, ttl: Option<Duration>) -> Result<()>;

    /// Removes `key`. Returns true when an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Removes every entry.
    async fn clear(&self) -> Result<()>;

    /// Succeeds when the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Deletes expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
