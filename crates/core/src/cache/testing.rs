//! In-memory persistent tier doubles shared by the cache and service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use finrelay_market_data::{
    AssetType, DataPoint, DataResponse, Market, ProviderInfo, Query, Timeframe,
};
use rust_decimal_macros::dec;

use super::cache_traits::PersistentCache;
use crate::errors::{CacheError, Result};

struct Stored {
    response: DataResponse,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Stored>>,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
}

impl MemoryCache {
    pub fn insert(&self, key: &str, response: &DataResponse) {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Stored {
                response: response.clone(),
                ttl: None,
                expires_at: None,
            },
        );
    }

    pub fn ttl_of(&self, key: &str) -> Option<Option<Duration>> {
        self.entries.lock().unwrap().get(key).map(|s| s.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }
}

fn live(stored: &Stored) -> bool {
    stored.expires_at.map_or(true, |at| Instant::now() < at)
}

#[async_trait]
impl PersistentCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<DataResponse>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|s| live(s))
            .map(|s| s.response.clone()))
    }

    async fn set(&self, key: &str, response: &DataResponse, ttl: Option<Duration>) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Stored {
                response: response.clone(),
                ttl,
                expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().get(key).is_some_and(live))
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, s| live(s));
        Ok(before - entries.len())
    }
}

/// A persistent tier that is always down.
pub struct FailingCache;

fn down() -> crate::errors::Error {
    CacheError::Unavailable("database is locked".to_string()).into()
}

#[async_trait]
impl PersistentCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<DataResponse>> {
        Err(down())
    }

    async fn set(
        &self,
        _key: &str,
        _response: &DataResponse,
        _ttl: Option<Duration>,
    ) -> Result<()> {
        Err(down())
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(down())
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Err(down())
    }

    async fn clear(&self) -> Result<()> {
        Err(down())
    }

    async fn ping(&self) -> Result<()> {
        Err(down())
    }

    async fn purge_expired(&self) -> Result<usize> {
        Err(down())
    }
}

pub fn sample_query() -> Query {
    Query::new(AssetType::Stock)
        .with_market(Market::Cn)
        .with_symbols(["000001"])
        .with_timeframe(Timeframe::Day1)
}

pub fn sample_response() -> DataResponse {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let point = DataPoint::ohlcv(
        "000001",
        ts,
        dec!(10.5),
        dec!(11.0),
        dec!(10.1),
        dec!(10.8),
        dec!(120000),
    );
    DataResponse::new(vec![point], ProviderInfo::new("mock"), sample_query())
}
