//! Cache and service configuration.
//!
//! Defaults reproduce the cache policy; every value can be overridden from
//! `FINRELAY_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use finrelay_market_data::{MarketDataError, RouterConfig};
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, Result};

/// Default number of entries held by the in-memory tier.
pub const DEFAULT_L1_CAPACITY: usize = 1000;

/// TTL given to entries copied from L2 back into L1.
pub const DEFAULT_L1_BACKFILL_TTL: Duration = Duration::from_secs(300);

/// L2 keeps entries this many times longer than L1.
pub const DEFAULT_L2_TTL_MULTIPLIER: u32 = 10;

/// Multi-level cache settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 0 turns L1 into a no-op sink
    pub l1_capacity: usize,
    pub l1_backfill_ttl: Duration,
    pub l2_ttl_multiplier: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: DEFAULT_L1_CAPACITY,
            l1_backfill_ttl: DEFAULT_L1_BACKFILL_TTL,
            l2_ttl_multiplier: DEFAULT_L2_TTL_MULTIPLIER,
        }
    }
}

impl CacheConfig {
    /// Reads `FINRELAY_L1_CAPACITY`, `FINRELAY_L1_BACKFILL_TTL_SECS` and
    /// `FINRELAY_L2_TTL_MULTIPLIER`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var::<usize, _>(&lookup, "FINRELAY_L1_CAPACITY")? {
            config.l1_capacity = v;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FINRELAY_L1_BACKFILL_TTL_SECS")? {
            config.l1_backfill_ttl = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "FINRELAY_L2_TTL_MULTIPLIER")? {
            if v == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "FINRELAY_L2_TTL_MULTIPLIER".to_string(),
                    message: "must be at least 1".to_string(),
                }
                .into());
            }
            config.l2_ttl_multiplier = v;
        }
        Ok(config)
    }
}

/// Everything needed to assemble a data service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub router: RouterConfig,

    /// Location of the persistent cache database. `None` lets the storage
    /// layer pick its default.
    pub database_url: Option<String>,
}

impl ServiceConfig {
    /// Loads cache and router settings plus `FINRELAY_DATABASE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache = CacheConfig::from_lookup(&lookup)?;
        let router = RouterConfig::from_lookup(&lookup).map_err(|e| match e {
            MarketDataError::InvalidConfig { key, message } => {
                ConfigError::InvalidValue { key, message }
            }
            other => ConfigError::InvalidValue {
                key: "router".to_string(),
                message: other.to_string(),
            },
        })?;
        let database_url = lookup("FINRELAY_DATABASE_URL").filter(|s| !s.trim().is_empty());

        Ok(Self {
            cache,
            router,
            database_url,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }
            .into()
        }),
    }
}
