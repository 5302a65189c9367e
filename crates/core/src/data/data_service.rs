//! Request-level orchestration.
//!
//! `get_data` validates the query, answers from the cache when it can,
//! otherwise routes to a provider, scores the returned data and writes the
//! enriched response back to the cache in the background.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use finrelay_market_data::{DataResponse, DataRouter, MarketDataError, Query, ResponseMetadata};
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use super::health::{HealthStatus, ServiceHealth};
use super::quality;
use super::traits::DataServiceTrait;
use crate::cache::{CacheKey, MultiLevelCache};
use crate::errors::{Error, Result, ValidationError};

/// Top-level data service.
pub struct DataService {
    cache: Arc<MultiLevelCache>,
    router: Arc<DataRouter>,

    /// Background cache writes not yet awaited
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl DataService {
    pub fn new(cache: Arc<MultiLevelCache>, router: Arc<DataRouter>) -> Self {
        Self {
            cache,
            router,
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn cache(&self) -> &Arc<MultiLevelCache> {
        &self.cache
    }

    pub fn router(&self) -> &Arc<DataRouter> {
        &self.router
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending_writes.lock().unwrap_or_else(|poisoned| {
            warn!("Pending write mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn validate(query: &Query) -> Result<()> {
        query.validate().map_err(|e| match e {
            MarketDataError::InvalidQuery(message) => {
                Error::Validation(ValidationError::InvalidQuery(message))
            }
            other => Error::MarketData(other),
        })
    }

    /// Persist `response` without making the caller wait.
    fn spawn_write_back(&self, query: Query, response: DataResponse) {
        let cache = Arc::clone(&self.cache);
        let handle = tokio::spawn(async move {
            cache.set_data(&query, &response).await;
        });

        let mut pending = self.lock_pending();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every background cache write started so far.
    pub async fn flush_pending_writes(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock_pending());
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Cache write-back task failed: {}", e);
            }
        }
        if count > 0 {
            debug!("Flushed {} pending cache writes", count);
        }
    }

    /// Start the router's periodic score decay and health sweep. Must be
    /// called from within a tokio runtime; calling it twice is harmless.
    pub fn start_background_tasks(&self) {
        self.router.start_background_tasks();
    }

    /// Stop the router's background tasks and drain pending cache writes.
    pub async fn shutdown(&self) {
        self.router.shutdown().await;
        self.flush_pending_writes().await;
        info!("Data service stopped");
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[async_trait]
impl DataServiceTrait for DataService {
    async fn get_data(&self, query: &Query) -> Result<DataResponse> {
        let started = Instant::now();
        let query_time = Utc::now();
        Self::validate(query)?;

        if let Some(mut cached) = self.cache.get_data(query).await {
            cached.metadata.cache_hit = true;
            cached.metadata.execution_time_ms = elapsed_ms(started);
            debug!("Cache hit for {} query", query.asset);
            return Ok(cached);
        }

        let mut response = self.router.execute_query(query).await?;

        let report = quality::assess(&response.data);
        let mut warnings = std::mem::take(&mut response.metadata.warnings);
        for warning in &report.warnings {
            warn!("{} ({} from '{}')", warning, query.asset, response.source.name);
        }
        warnings.extend(report.warnings);

        response.metadata = ResponseMetadata {
            query_time,
            execution_time_ms: elapsed_ms(started),
            record_count: response.data.len(),
            cache_hit: false,
            data_quality_score: report.score,
            warnings,
        };

        self.spawn_write_back(query.clone(), response.clone());
        Ok(response)
    }

    async fn get_batch_data(&self, queries: &[Query]) -> Vec<Result<DataResponse>> {
        join_all(queries.iter().map(|query| self.get_data(query))).await
    }

    async fn invalidate(&self, query: &Query) -> bool {
        let key = CacheKey::derive(query);
        let removed = self.cache.delete(&key.key).await;
        debug!("Invalidated {} (present: {})", key, removed);
        removed
    }

    async fn health_check(&self) -> ServiceHealth {
        let cache_reachable = self.cache.ping().await;
        let provider_count = self.router.registry().provider_count();
        let status = HealthStatus::from_checks(cache_reachable, provider_count > 0);

        if status != HealthStatus::Healthy {
            warn!(
                "Service is {} (cache reachable: {}, providers: {})",
                status, cache_reachable, provider_count
            );
        }

        ServiceHealth {
            status,
            cache_reachable,
            provider_count,
            checked_at: Utc::now(),
        }
    }
}
