//! Deterministic cache keys and TTL classes.
//!
//! The key is the lowercase hex MD5 digest of
//! `asset|market|symbols|provider|timeframe|start|end|limit`, with symbols
//! sorted, deduplicated and comma-joined, and absent fields rendered as "".

use std::time::Duration;

use chrono::SecondsFormat;
use finrelay_market_data::{Query, Timeframe};
use serde::{Deserialize, Serialize};

/// TTL for queries without a timeframe.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Freshness policy per data granularity, in seconds.
pub fn ttl_for_timeframe(timeframe: Option<Timeframe>) -> u64 {
    match timeframe {
        Some(Timeframe::Tick) => 5,
        Some(Timeframe::Minute1) => 60,
        Some(Timeframe::Minute5) => 300,
        Some(Timeframe::Minute15) => 900,
        Some(Timeframe::Minute30) => 1800,
        Some(Timeframe::Hour1) => 3600,
        Some(Timeframe::Hour4) => 14400,
        Some(Timeframe::Day1) => 3600,
        Some(Timeframe::Week1) => 86400,
        Some(Timeframe::Month1) => 86400,
        None => DEFAULT_TTL_SECS,
    }
}

/// A derived cache key plus the TTL class of its query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub key: String,
    pub ttl_secs: u64,
}

impl CacheKey {
    pub fn derive(query: &Query) -> Self {
        let digest = md5::compute(canonical_form(query).as_bytes());
        Self {
            key: format!("{:x}", digest),
            ttl_secs: ttl_for_timeframe(query.timeframe),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

fn canonical_form(query: &Query) -> String {
    let symbols = query
        .symbols
        .as_ref()
        .map(|symbols| {
            let mut sorted: Vec<&str> = symbols.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            sorted.dedup();
            sorted.join(",")
        })
        .unwrap_or_default();

    let rfc3339 =
        |t: &chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::AutoSi, true);

    [
        query.asset.as_str().to_string(),
        query.market.map(|m| m.as_str().to_string()).unwrap_or_default(),
        symbols,
        query.provider.clone().unwrap_or_default(),
        query.timeframe.map(|t| t.as_str().to_string()).unwrap_or_default(),
        query.start.as_ref().map(rfc3339).unwrap_or_default(),
        query.end.as_ref().map(rfc3339).unwrap_or_default(),
        query.limit.map(|l| l.to_string()).unwrap_or_default(),
    ]
    .join("|")
}
