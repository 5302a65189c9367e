use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::query::normalize_symbol;

/// A single observation returned by a provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Normalized symbol (uppercase, trimmed)
    pub symbol: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,

    /// Provider-specific fields that have no canonical column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<HashMap<String, serde_json::Value>>,
}

impl DataPoint {
    /// Create a point with only symbol and timestamp set.
    pub fn new(symbol: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            timestamp,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            extra: None,
        }
    }

    /// Create a full OHLCV point.
    pub fn ohlcv(
        symbol: &str,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
            ..Self::new(symbol, timestamp)
        }
    }

    /// Number of populated OHLCV fields (0..=5).
    pub fn populated_ohlcv_fields(&self) -> usize {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .filter(|field| field.is_some())
            .count()
    }
}
