//! Database models for the persistent cache tier.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use finrelay_market_data::{DataPoint, DataResponse, Timeframe};

/// Market column value for responses whose query named no market.
pub const NO_MARKET: &str = "";

/// Formats a timestamp for storage. Fixed width (microseconds, `Z` suffix) so
/// text comparison in SQL orders the same way as time.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

/// Database model for a serialized cache entry
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::cache_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CacheEntryDB {
    pub cache_key: String,
    pub response_json: String,
    pub expires_at: Option<String>,
    pub created_at: String,
}

/// Database model for daily bars
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::ohlcv_daily)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct OhlcvDailyDB {
    pub symbol: String,
    /// `YYYY-MM-DD` in UTC
    pub trade_date: String,
    pub market: String,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub volume: Option<String>,
    pub provider: String,
    pub updated_at: String,
}

/// Database model for intraday bars
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::ohlcv_intraday)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct OhlcvIntradayDB {
    pub symbol: String,
    pub timestamp: String,
    pub market: String,
    pub timeframe: String,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub volume: Option<String>,
    pub provider: String,
    pub updated_at: String,
}

impl OhlcvDailyDB {
    fn from_point(point: &DataPoint, market: &str, provider: &str, updated_at: &str) -> Self {
        Self {
            symbol: point.symbol.clone(),
            trade_date: point.timestamp.date_naive().format("%Y-%m-%d").to_string(),
            market: market.to_string(),
            open: decimal_text(point.open),
            high: decimal_text(point.high),
            low: decimal_text(point.low),
            close: decimal_text(point.close),
            volume: decimal_text(point.volume),
            provider: provider.to_string(),
            updated_at: updated_at.to_string(),
        }
    }
}

impl OhlcvIntradayDB {
    fn from_point(
        point: &DataPoint,
        market: &str,
        timeframe: Timeframe,
        provider: &str,
        updated_at: &str,
    ) -> Self {
        Self {
            symbol: point.symbol.clone(),
            timestamp: format_timestamp(point.timestamp),
            market: market.to_string(),
            timeframe: timeframe.as_str().to_string(),
            open: decimal_text(point.open),
            high: decimal_text(point.high),
            low: decimal_text(point.low),
            close: decimal_text(point.close),
            volume: decimal_text(point.volume),
            provider: provider.to_string(),
            updated_at: updated_at.to_string(),
        }
    }
}

/// Rows a response contributes to the OHLCV tables.
#[derive(Debug, Clone, PartialEq)]
pub enum OhlcvRows {
    Daily(Vec<OhlcvDailyDB>),
    Intraday(Vec<OhlcvIntradayDB>),
}

impl OhlcvRows {
    pub fn len(&self) -> usize {
        match self {
            OhlcvRows::Daily(rows) => rows.len(),
            OhlcvRows::Intraday(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits a response into OHLCV rows keyed by its query timeframe.
///
/// Daily responses map to `ohlcv_daily`, intraday ones to `ohlcv_intraday`.
/// Weekly, monthly and timeframe-less responses are not denormalized. Points
/// without a symbol are skipped.
pub fn denormalize(response: &DataResponse, now: DateTime<Utc>) -> Option<OhlcvRows> {
    let timeframe = response.query.timeframe?;
    let market = response
        .query
        .market
        .map(|m| m.as_str())
        .unwrap_or(NO_MARKET);
    let provider = response.source.name.as_str();
    let updated_at = format_timestamp(now);

    let points = response.data.iter().filter(|p| !p.symbol.trim().is_empty());

    let rows = if timeframe == Timeframe::Day1 {
        OhlcvRows::Daily(
            points
                .map(|p| OhlcvDailyDB::from_point(p, market, provider, &updated_at))
                .collect(),
        )
    } else if timeframe.is_intraday() {
        OhlcvRows::Intraday(
            points
                .map(|p| OhlcvIntradayDB::from_point(p, market, timeframe, provider, &updated_at))
                .collect(),
        )
    } else {
        return None;
    };

    (!rows.is_empty()).then_some(rows)
}
