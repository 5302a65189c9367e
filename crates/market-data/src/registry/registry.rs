//! Provider registry.
//!
//! The registry owns the registered providers and their last known health.
//! It answers one question for the router: which providers can serve this
//! query right now.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};

use crate::errors::MarketDataError;
use crate::models::Query;
use crate::provider::DataProvider;

/// Registry of data providers with per-provider health flags.
///
/// Providers are kept in registration order; candidate lists preserve it.
/// Newly registered providers start healthy.
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn DataProvider>>>,
    health: Mutex<HashMap<String, bool>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry pre-populated with `providers`.
    pub fn with_providers(
        providers: Vec<Arc<dyn DataProvider>>,
    ) -> Result<Self, MarketDataError> {
        let registry = Self::new();
        for provider in providers {
            registry.register(provider)?;
        }
        Ok(registry)
    }

    fn read_providers(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn DataProvider>>> {
        self.providers.read().unwrap_or_else(|poisoned| {
            warn!("Provider registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_providers(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn DataProvider>>> {
        self.providers.write().unwrap_or_else(|poisoned| {
            warn!("Provider registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_health(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.health.lock().unwrap_or_else(|poisoned| {
            warn!("Provider health mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register a provider.
    ///
    /// A provider with the same name replaces the previous registration and
    /// its health is reset to healthy.
    pub fn register(&self, provider: Arc<dyn DataProvider>) -> Result<(), MarketDataError> {
        let name = provider.name().to_string();
        if name.trim().is_empty() {
            return Err(MarketDataError::InvalidConfig {
                key: "provider.name".to_string(),
                message: "provider name must not be empty".to_string(),
            });
        }

        {
            let mut providers = self.write_providers();
            if let Some(existing) = providers.iter_mut().find(|p| p.name() == name) {
                warn!("Provider '{}' already registered, replacing it", name);
                *existing = provider;
            } else {
                providers.push(provider);
            }
        }

        self.lock_health().insert(name.clone(), true);
        info!("Registered provider '{}'", name);
        Ok(())
    }

    /// Remove a provider. Returns false when no provider had that name.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut providers = self.write_providers();
            let before = providers.len();
            providers.retain(|p| p.name() != name);
            providers.len() != before
        };

        if removed {
            self.lock_health().remove(name);
            info!("Unregistered provider '{}'", name);
        }
        removed
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DataProvider>> {
        self.read_providers()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// All registered providers, in registration order.
    pub fn providers(&self) -> Vec<Arc<dyn DataProvider>> {
        self.read_providers().clone()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.read_providers()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn provider_count(&self) -> usize {
        self.read_providers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.provider_count() == 0
    }

    /// Providers that can serve `query` and are currently healthy.
    ///
    /// When the query names a preferred provider that is among the candidates,
    /// only that provider is returned. A hint naming a provider that is not a
    /// candidate is ignored.
    pub fn find_capable_providers(&self, query: &Query) -> Vec<Arc<dyn DataProvider>> {
        let providers = self.providers();
        let health = self.lock_health().clone();

        let candidates: Vec<Arc<dyn DataProvider>> = providers
            .into_iter()
            .filter(|p| {
                let healthy = health.get(p.name()).copied().unwrap_or(false);
                if !healthy {
                    debug!("Skipping unhealthy provider '{}'", p.name());
                }
                healthy && p.can_handle_query(query)
            })
            .collect();

        if let Some(hint) = query.provider.as_deref() {
            if let Some(preferred) = candidates.iter().find(|p| p.name() == hint) {
                return vec![Arc::clone(preferred)];
            }
            warn!(
                "Preferred provider '{}' cannot serve this query, ignoring hint",
                hint
            );
        }

        candidates
    }

    pub fn mark_healthy(&self, name: &str) {
        self.set_health(name, true);
    }

    pub fn mark_unhealthy(&self, name: &str) {
        self.set_health(name, false);
    }

    /// Record the health of a registered provider. Unknown names are ignored.
    pub fn set_health(&self, name: &str, healthy: bool) {
        let mut health = self.lock_health();
        match health.get_mut(name) {
            Some(current) => {
                if *current != healthy {
                    info!(
                        "Provider '{}' is now {}",
                        name,
                        if healthy { "healthy" } else { "unhealthy" }
                    );
                }
                *current = healthy;
            }
            None => debug!("Ignoring health update for unknown provider '{}'", name),
        }
    }

    /// Last recorded health. Unknown providers are reported unhealthy.
    pub fn is_healthy(&self, name: &str) -> bool {
        self.lock_health().get(name).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetType, DataResponse, Market, ProviderInfo};
    use crate::provider::ProviderCapability;
    use async_trait::async_trait;

    struct StaticProvider {
        name: &'static str,
        markets: Vec<Market>,
    }

    #[async_trait]
    impl DataProvider for StaticProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn capability(&self) -> ProviderCapability {
            ProviderCapability {
                supported_assets: vec![AssetType::Stock],
                supported_markets: self.markets.clone(),
                ..ProviderCapability::default()
            }
        }

        async fn get_data(&self, query: &Query) -> Result<DataResponse, MarketDataError> {
            Ok(DataResponse::new(
                vec![],
                ProviderInfo::new(self.name),
                query.clone(),
            ))
        }

        async fn health_check(&self) -> Result<bool, MarketDataError> {
            Ok(true)
        }
    }

    fn provider(name: &'static str, markets: Vec<Market>) -> Arc<dyn DataProvider> {
        Arc::new(StaticProvider { name, markets })
    }

    fn names(providers: &[Arc<dyn DataProvider>]) -> Vec<&str> {
        providers.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = ProviderRegistry::new();
        registry.register(provider("a", vec![Market::Cn])).unwrap();
        registry.register(provider("b", vec![Market::Us])).unwrap();
        assert_eq!(registry.provider_count(), 2);
        assert!(registry.is_healthy("a"));

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert_eq!(registry.provider_names(), vec!["b".to_string()]);
        assert!(!registry.is_healthy("a"));
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let registry = ProviderRegistry::new();
        let result = registry.register(provider("  ", vec![Market::Cn]));
        assert!(matches!(result, Err(MarketDataError::InvalidConfig { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_same_name_replaces() {
        let registry = ProviderRegistry::new();
        registry.register(provider("a", vec![Market::Cn])).unwrap();
        registry.mark_unhealthy("a");
        registry.register(provider("a", vec![Market::Us])).unwrap();

        assert_eq!(registry.provider_count(), 1);
        assert!(registry.is_healthy("a"));
        let query = Query::new(AssetType::Stock).with_market(Market::Us);
        assert_eq!(names(&registry.find_capable_providers(&query)), vec!["a"]);
    }

    #[test]
    fn test_find_capable_filters_capability_and_health() {
        let registry = ProviderRegistry::new();
        registry.register(provider("cn1", vec![Market::Cn])).unwrap();
        registry.register(provider("cn2", vec![Market::Cn])).unwrap();
        registry.register(provider("us", vec![Market::Us])).unwrap();

        let query = Query::new(AssetType::Stock).with_market(Market::Cn);
        assert_eq!(
            names(&registry.find_capable_providers(&query)),
            vec!["cn1", "cn2"]
        );

        registry.mark_unhealthy("cn1");
        assert_eq!(names(&registry.find_capable_providers(&query)), vec!["cn2"]);

        registry.mark_healthy("cn1");
        assert_eq!(registry.find_capable_providers(&query).len(), 2);

        let bonds = Query::new(AssetType::Bond);
        assert!(registry.find_capable_providers(&bonds).is_empty());
    }

    #[test]
    fn test_provider_hint() {
        let registry = ProviderRegistry::new();
        registry.register(provider("cn1", vec![Market::Cn])).unwrap();
        registry.register(provider("cn2", vec![Market::Cn])).unwrap();
        registry.register(provider("us", vec![Market::Us])).unwrap();

        let hinted = Query::new(AssetType::Stock)
            .with_market(Market::Cn)
            .with_provider("cn2");
        assert_eq!(names(&registry.find_capable_providers(&hinted)), vec!["cn2"]);

        let unusable_hint = Query::new(AssetType::Stock)
            .with_market(Market::Cn)
            .with_provider("us");
        assert_eq!(
            names(&registry.find_capable_providers(&unusable_hint)),
            vec!["cn1", "cn2"]
        );
    }

    #[test]
    fn test_health_update_for_unknown_provider_is_ignored() {
        let registry = ProviderRegistry::new();
        registry.mark_healthy("ghost");
        assert!(!registry.is_healthy("ghost"));
    }
}
