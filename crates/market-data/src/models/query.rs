use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::{AssetType, Market};
use super::timeframe::Timeframe;
use crate::errors::MarketDataError;

/// Normalizes a ticker symbol: trimmed and uppercased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// A financial-data query.
///
/// Symbol order carries no meaning; symbols are normalized and deduplicated
/// when set through [`Query::with_symbols`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub asset: AssetType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<Market>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,

    /// Preferred provider hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Query {
    pub fn new(asset: AssetType) -> Self {
        Self {
            asset,
            market: None,
            symbols: None,
            timeframe: None,
            start: None,
            end: None,
            provider: None,
            limit: None,
        }
    }

    pub fn with_market(mut self, market: Market) -> Self {
        self.market = Some(market);
        self
    }

    /// Sets the symbol list, normalizing each symbol and dropping duplicates
    /// while keeping first-seen order.
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = normalize_symbol(symbol.as_ref());
            if !normalized.contains(&symbol) {
                normalized.push(symbol);
            }
        }
        self.symbols = Some(normalized);
        self
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    pub fn with_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of requested symbols (0 when the query is not symbol-scoped).
    pub fn symbol_count(&self) -> usize {
        self.symbols.as_ref().map_or(0, Vec::len)
    }

    /// True when the query carries neither a start nor an end bound.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Checks the query invariants against the current time.
    pub fn validate(&self) -> Result<(), MarketDataError> {
        self.validate_at(Utc::now())
    }

    /// Checks the query invariants against `now`.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), MarketDataError> {
        if let Some(symbols) = &self.symbols {
            if symbols.is_empty() {
                return Err(MarketDataError::InvalidQuery(
                    "symbol list must not be empty".to_string(),
                ));
            }
            if symbols.iter().any(|s| s.trim().is_empty()) {
                return Err(MarketDataError::InvalidQuery(
                    "symbols must not be blank".to_string(),
                ));
            }
        }

        if let Some(start) = self.start {
            if start > now {
                return Err(MarketDataError::InvalidQuery(format!(
                    "start {} is in the future",
                    start.to_rfc3339()
                )));
            }
        }

        if let Some(end) = self.end {
            if end > now {
                return Err(MarketDataError::InvalidQuery(format!(
                    "end {} is in the future",
                    end.to_rfc3339()
                )));
            }
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(MarketDataError::InvalidQuery(format!(
                    "start {} is after end {}",
                    start.to_rfc3339(),
                    end.to_rfc3339()
                )));
            }
        }

        Ok(())
    }
}
