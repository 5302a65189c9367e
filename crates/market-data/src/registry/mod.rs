//! Provider registry module.
//!
//! Holds the registered providers and their health, and yields the
//! capability-filtered, health-filtered candidates for a query.

mod registry;

pub use registry::ProviderRegistry;
