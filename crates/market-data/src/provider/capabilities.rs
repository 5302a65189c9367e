//! Provider capability declarations.
//!
//! A provider describes what it can serve through [`ProviderCapability`]; the
//! registry and router use it to filter and score candidates.

use serde::{Deserialize, Serialize};

use crate::models::{AssetType, Market, Query, Timeframe};

/// Describes the support matrix of a data provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapability {
    /// Asset classes this provider serves.
    pub supported_assets: Vec<AssetType>,

    /// Markets this provider covers.
    pub supported_markets: Vec<Market>,

    /// Granularities this provider returns.
    pub supported_timeframes: Vec<Timeframe>,

    /// Maximum symbols accepted in a single request.
    pub max_symbols_per_request: usize,

    /// Whether the provider serves live (unbounded) queries.
    pub supports_real_time: bool,

    /// Whether the provider serves date-bounded history.
    pub supports_historical: bool,

    /// Advertised delay of the data, in seconds.
    pub data_delay_seconds: u32,
}

impl Default for ProviderCapability {
    fn default() -> Self {
        Self {
            supported_assets: Vec::new(),
            supported_markets: Vec::new(),
            supported_timeframes: Vec::new(),
            max_symbols_per_request: 100,
            supports_real_time: false,
            supports_historical: true,
            data_delay_seconds: 0,
        }
    }
}

impl ProviderCapability {
    /// Returns true when every dimension of `query` is covered.
    ///
    /// Unset query dimensions (no market, no timeframe, no symbols) never
    /// exclude a provider.
    pub fn supports(&self, query: &Query) -> bool {
        if !self.supported_assets.contains(&query.asset) {
            return false;
        }

        if let Some(market) = query.market {
            if !self.supported_markets.contains(&market) {
                return false;
            }
        }

        if let Some(timeframe) = query.timeframe {
            if !self.supported_timeframes.contains(&timeframe) {
                return false;
            }
        }

        if query.symbol_count() > self.max_symbols_per_request {
            return false;
        }

        if !query.is_unbounded() && !self.supports_historical {
            return false;
        }

        true
    }
}
