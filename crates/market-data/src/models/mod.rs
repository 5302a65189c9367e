//! Market data models
//!
//! This module contains the core data types for routing and caching:
//! - `asset` - Asset classification (AssetType) and market region (Market)
//! - `timeframe` - Bar granularity (Timeframe)
//! - `query` - The query contract (Query) and symbol normalization
//! - `data_point` - A single OHLCV observation (DataPoint)
//! - `response` - Provider responses (DataResponse, ResponseMetadata, ProviderInfo)

mod asset;
mod data_point;
mod query;
mod response;
mod timeframe;

pub use asset::{AssetType, Market};
pub use data_point::DataPoint;
pub use query::{normalize_symbol, Query};
pub use response::{DataResponse, ProviderInfo, ResponseMetadata};
pub use timeframe::Timeframe;
