//! Data provider trait definition.
//!
//! This module defines the `DataProvider` trait that every provider adapter
//! implements. Adapters live outside this crate.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{DataResponse, Query};

use super::capabilities::ProviderCapability;

/// Trait for data providers.
///
/// The registry filters providers with [`can_handle_query`](Self::can_handle_query),
/// the router scores them from [`capability`](Self::capability) and calls
/// [`get_data`](Self::get_data).
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use finrelay_market_data::{
///     DataProvider, DataResponse, MarketDataError, ProviderCapability, Query,
/// };
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl DataProvider for MyProvider {
///     fn name(&self) -> &str {
///         "my_provider"
///     }
///
///     fn capability(&self) -> ProviderCapability {
///         ProviderCapability::default()
///     }
///
///     async fn get_data(&self, query: &Query) -> Result<DataResponse, MarketDataError> {
///         // ... call the upstream API
///     }
///
///     async fn health_check(&self) -> Result<bool, MarketDataError> {
///         Ok(true)
///     }
/// }
/// ```
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Unique, non-empty identifier for this provider.
    fn name(&self) -> &str;

    /// Describes what this provider can serve.
    fn capability(&self) -> ProviderCapability;

    /// Whether this provider can serve `query`.
    ///
    /// Must stay consistent with [`capability`](Self::capability); the default
    /// derives the answer from it.
    fn can_handle_query(&self, query: &Query) -> bool {
        self.capability().supports(query)
    }

    /// Fetch data for a query.
    ///
    /// Fails with [`MarketDataError::ProviderError`] or
    /// [`MarketDataError::RateLimited`].
    async fn get_data(&self, query: &Query) -> Result<DataResponse, MarketDataError>;

    /// Check whether the provider is reachable.
    ///
    /// An `Err` is treated exactly like `Ok(false)`.
    async fn health_check(&self) -> Result<bool, MarketDataError>;
}
