//! Query routing.
//!
//! - `config` - Router tuning knobs (RouterConfig)
//! - `score` - Per-provider performance record (ProviderScore)
//! - `strategy` - Selection strategies among scored candidates
//! - `data_router` - The router itself: selection, fallback, health, decay

mod config;
mod data_router;
mod score;
mod strategy;

pub use config::RouterConfig;
pub use data_router::DataRouter;
pub use score::ProviderScore;
pub use strategy::SelectionStrategy;
