//! Data service module.
//!
//! - [`data_service`] - Validate, cache, route, score and write back
//! - [`quality`] - Data quality scoring for provider responses
//! - [`health`] - Service health model
//! - [`traits`] - Service trait consumed by front-ends

pub mod data_service;
pub mod health;
pub mod quality;
pub mod traits;

pub use data_service::DataService;
pub use health::{HealthStatus, ServiceHealth};
pub use quality::QualityReport;
pub use traits::DataServiceTrait;
