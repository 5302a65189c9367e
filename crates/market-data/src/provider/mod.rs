//! Data provider abstractions.
//!
//! This module contains:
//! - The `DataProvider` trait that all provider adapters implement
//! - Provider capability declarations
//!
//! Concrete adapters (thin wrappers over third-party data APIs) are not part
//! of this crate; they implement `DataProvider` and are handed to the
//! [`ProviderRegistry`](crate::registry::ProviderRegistry).

mod capabilities;
mod traits;

pub use capabilities::ProviderCapability;
pub use traits::DataProvider;
