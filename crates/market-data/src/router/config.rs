use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::strategy::SelectionStrategy;
use crate::errors::MarketDataError;

/// Maximum provider attempts per query.
const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// How long a provider's health check result is reused.
const DEFAULT_HEALTH_CACHE_INTERVAL: Duration = Duration::from_secs(60);

/// Concurrent health checks during a sweep.
const DEFAULT_HEALTH_CHECK_CONCURRENCY: usize = 5;

const DEFAULT_HEALTH_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_DECAY_INTERVAL: Duration = Duration::from_secs(300);

/// Router tuning knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub max_attempts: usize,
    pub strategy: SelectionStrategy,

    /// Neutral score given to a provider on first sight
    pub initial_score: f64,
    pub min_score: f64,
    pub max_score: f64,

    /// Score added on success, divided by `1 + latency_s`
    pub success_bonus: f64,
    /// Score removed on failure
    pub failure_penalty: f64,

    /// Number of attempts kept in each provider's recent window
    pub recent_window: usize,
    pub decay_factor: f64,
    pub decay_interval: Duration,

    /// `None` disables health caching: every call checks the provider.
    pub health_cache_interval: Option<Duration>,
    pub health_check_concurrency: usize,
    pub health_sweep_interval: Duration,

    pub delay_penalty_per_second: f64,
    pub max_delay_penalty: f64,
    pub symbol_headroom_bonus: f64,
    pub real_time_bonus: f64,

    /// Added to every weight in weighted-random selection
    pub exploration_floor: f64,

    /// Fixed seed for the selection RNG.
    pub rng_seed: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategy: SelectionStrategy::default(),
            initial_score: 1.0,
            min_score: 0.1,
            max_score: 2.0,
            success_bonus: 0.1,
            failure_penalty: 0.2,
            recent_window: 20,
            decay_factor: 0.9,
            decay_interval: DEFAULT_DECAY_INTERVAL,
            health_cache_interval: Some(DEFAULT_HEALTH_CACHE_INTERVAL),
            health_check_concurrency: DEFAULT_HEALTH_CHECK_CONCURRENCY,
            health_sweep_interval: DEFAULT_HEALTH_SWEEP_INTERVAL,
            delay_penalty_per_second: 0.01,
            max_delay_penalty: 0.5,
            symbol_headroom_bonus: 0.1,
            real_time_bonus: 0.2,
            exploration_floor: 0.01,
            rng_seed: None,
        }
    }
}

impl RouterConfig {
    /// Load overrides from `FINRELAY_*` environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `FINRELAY_MAX_ATTEMPTS` | `max_attempts` |
    /// | `FINRELAY_ROUTING_STRATEGY` | `strategy` |
    /// | `FINRELAY_HEALTH_CACHE_SECS` | `health_cache_interval` (0 disables) |
    /// | `FINRELAY_HEALTH_CHECK_CONCURRENCY` | `health_check_concurrency` |
    /// | `FINRELAY_HEALTH_SWEEP_SECS` | `health_sweep_interval` |
    /// | `FINRELAY_SCORE_DECAY_SECS` | `decay_interval` |
    /// | `FINRELAY_SCORE_DECAY_FACTOR` | `decay_factor` |
    /// | `FINRELAY_ROUTER_SEED` | `rng_seed` |
    pub fn from_env() -> Result<Self, MarketDataError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MarketDataError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<usize, _>(&lookup, "FINRELAY_MAX_ATTEMPTS")? {
            config.max_attempts = v;
        }
        if let Some(v) = lookup("FINRELAY_ROUTING_STRATEGY") {
            config.strategy = v.parse()?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FINRELAY_HEALTH_CACHE_SECS")? {
            config.health_cache_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "FINRELAY_HEALTH_CHECK_CONCURRENCY")? {
            config.health_check_concurrency = v;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FINRELAY_HEALTH_SWEEP_SECS")? {
            config.health_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FINRELAY_SCORE_DECAY_SECS")? {
            config.decay_interval = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, "FINRELAY_SCORE_DECAY_FACTOR")? {
            config.decay_factor = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "FINRELAY_ROUTER_SEED")? {
            config.rng_seed = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.health_check_concurrency == 0 {
            return Err(invalid("health_check_concurrency", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.decay_factor) {
            return Err(invalid("decay_factor", "must be within [0, 1]"));
        }
        if !(self.min_score > 0.0
            && self.min_score <= self.initial_score
            && self.initial_score <= self.max_score)
        {
            return Err(invalid(
                "score bounds",
                "expected 0 < min_score <= initial_score <= max_score",
            ));
        }
        if self.health_sweep_interval.is_zero() || self.decay_interval.is_zero() {
            return Err(invalid("intervals", "background intervals must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> MarketDataError {
    MarketDataError::InvalidConfig {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, MarketDataError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| MarketDataError::InvalidConfig {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
    }
}
