use async_trait::async_trait;
use finrelay_market_data::{DataResponse, Query};

use super::health::ServiceHealth;
use crate::errors::Result;

/// Trait for the data service, the entry point used by front-ends.
#[async_trait]
pub trait DataServiceTrait: Send + Sync {
    /// Serves a query from cache or from the best available provider.
    async fn get_data(&self, query: &Query) -> Result<DataResponse>;

    /// Serves several queries concurrently; results keep the input order.
    async fn get_batch_data(&self, queries: &[Query]) -> Vec<Result<DataResponse>>;

    /// Drops the cached response for `query` from every tier.
    async fn invalidate(&self, query: &Query) -> bool;

    async fn health_check(&self) -> ServiceHealth;
}
