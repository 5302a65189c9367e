//! Finrelay Market Data Crate
//!
//! Provider-facing half of finrelay: the query and response models, the
//! provider contract, the provider registry and the scoring-based router.
//!
//! # Overview
//!
//! - Queries describe an asset class, market, symbols, timeframe and range
//! - Providers declare what they serve through [`ProviderCapability`]
//! - The [`ProviderRegistry`] yields capable, healthy candidates
//! - The [`DataRouter`] scores candidates, picks one and falls back on failure
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |      Query       |
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |    DataRouter    | --> | ProviderScore    |  (performance, decay)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! | ProviderRegistry |  (capability + health filter)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |   DataProvider   |  (external adapters)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |   DataResponse   |
//! +------------------+
//! ```
//!
//! Caching and the request-level service live in `finrelay-core`.

pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod router;

pub use errors::{MarketDataError, RetryClass};

pub use models::{
    normalize_symbol, AssetType, DataPoint, DataResponse, Market, ProviderInfo, Query,
    ResponseMetadata, Timeframe,
};

pub use provider::{DataProvider, ProviderCapability};

pub use registry::ProviderRegistry;

pub use router::{DataRouter, ProviderScore, RouterConfig, SelectionStrategy};
