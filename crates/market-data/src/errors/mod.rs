//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for routing and provider operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during market data operations.
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    /// The query violates one of its invariants.
    /// Terminal - retrying the same query can never succeed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// No provider could serve the query.
    ///
    /// Raised when the registry yields no capable, healthy candidate or when
    /// the router exhausted its attempt budget.
    #[error(
        "No provider available for {asset}: attempted [{}]{}",
        .attempted.join(", "),
        last_error_suffix(.last_error)
    )]
    NoProviderAvailable {
        /// Asset class of the failed query
        asset: String,
        /// Providers that were tried, in order
        attempted: Vec<String>,
        /// Last underlying provider error, if any attempt was made
        last_error: Option<String>,
    },

    /// A provider-specific error occurred.
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider rate limited the request.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
        /// Optional hint for when the provider accepts requests again
        retry_after: Option<Duration>,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider's health check raised instead of answering.
    #[error("Health check failed: {provider} - {message}")]
    HealthCheckFailed { provider: String, message: String },

    /// A router setting could not be parsed.
    #[error("Invalid configuration for {key}: {message}")]
    InvalidConfig { key: String, message: String },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(", last error: {e}"))
        .unwrap_or_default()
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// Every provider-side failure is treated the same way: the provider is
    /// penalized and the next candidate is tried.
    ///
    /// # Examples
    ///
    /// ```
    /// use finrelay_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::RateLimited {
    ///     provider: "akshare".to_string(),
    ///     retry_after: None,
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::NextProvider);
    ///
    /// let error = MarketDataError::InvalidQuery("empty symbol list".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::InvalidQuery(_)
            | Self::NoProviderAvailable { .. }
            | Self::InvalidConfig { .. } => RetryClass::Never,

            Self::ProviderError { .. }
            | Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::HealthCheckFailed { .. } => RetryClass::NextProvider,
        }
    }

    /// Provider name carried by the error, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::ProviderError { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Timeout { provider }
            | Self::HealthCheckFailed { provider, .. } => Some(provider),
            Self::InvalidQuery(_)
            | Self::NoProviderAvailable { .. }
            | Self::InvalidConfig { .. } => None,
        }
    }

    /// Retry-after hint when the provider rate limited the request.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
