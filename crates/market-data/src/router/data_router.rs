//! Scoring-based data router.
//!
//! For every query the router asks the registry for candidates, scores them,
//! picks one according to the configured [`SelectionStrategy`], and falls
//! back to the remaining candidates when a provider fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use super::config::RouterConfig;
use super::score::ProviderScore;
use super::strategy::{best_index, lowest_index, weighted_index, SelectionStrategy};
use crate::errors::MarketDataError;
use crate::models::{DataResponse, Query};
use crate::provider::DataProvider;
use crate::registry::ProviderRegistry;

#[derive(Clone, Copy, Debug)]
struct HealthEntry {
    healthy: bool,
    checked_at: Instant,
}

struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Routes queries to providers.
///
/// Score state and the health cache each sit behind their own mutex; neither
/// is held across an `.await`.
pub struct DataRouter {
    registry: Arc<ProviderRegistry>,
    config: RouterConfig,
    scores: Mutex<HashMap<String, ProviderScore>>,
    health_cache: Mutex<HashMap<String, HealthEntry>>,
    health_permits: Semaphore,
    rng: Mutex<StdRng>,
    round_robin: AtomicUsize,
    background: Mutex<Option<BackgroundTasks>>,
}

impl DataRouter {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_config(registry, RouterConfig::default())
    }

    pub fn with_config(registry: Arc<ProviderRegistry>, config: RouterConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let permits = config.health_check_concurrency.max(1);

        Self {
            registry,
            health_permits: Semaphore::new(permits),
            scores: Mutex::new(HashMap::new()),
            health_cache: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
            round_robin: AtomicUsize::new(0),
            background: Mutex::new(None),
            config,
        }
    }

    /// Replace the selection random source.
    pub fn with_rng(self, rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            ..self
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    fn lock_scores(&self) -> MutexGuard<'_, HashMap<String, ProviderScore>> {
        self.scores.lock().unwrap_or_else(|poisoned| {
            warn!("Router score mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_health_cache(&self) -> MutexGuard<'_, HashMap<String, HealthEntry>> {
        self.health_cache.lock().unwrap_or_else(|poisoned| {
            warn!("Router health cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| {
            warn!("Router RNG mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_background(&self) -> MutexGuard<'_, Option<BackgroundTasks>> {
        self.background.lock().unwrap_or_else(|poisoned| {
            warn!("Router background task mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Pick the provider that should serve `query`.
    pub fn route_query(&self, query: &Query) -> Result<Arc<dyn DataProvider>, MarketDataError> {
        self.select_provider(query, &[])
    }

    fn select_provider(
        &self,
        query: &Query,
        exclude: &[String],
    ) -> Result<Arc<dyn DataProvider>, MarketDataError> {
        let mut candidates: Vec<Arc<dyn DataProvider>> = self
            .registry
            .find_capable_providers(query)
            .into_iter()
            .filter(|p| !exclude.iter().any(|name| name == p.name()))
            .collect();

        if candidates.is_empty() {
            return Err(MarketDataError::NoProviderAvailable {
                asset: query.asset.to_string(),
                attempted: exclude.to_vec(),
                last_error: None,
            });
        }

        if candidates.len() == 1 {
            return Ok(candidates.swap_remove(0));
        }

        let index = match self.config.strategy {
            SelectionStrategy::WeightedRandom => {
                let scores = self.composite_scores(&candidates, query);
                let mut rng = self.lock_rng();
                weighted_index(&scores, self.config.exploration_floor, &mut *rng)
            }
            SelectionStrategy::HighestScore => {
                best_index(&self.composite_scores(&candidates, query))
            }
            SelectionStrategy::LowestLatency => {
                let scores = self.lock_scores();
                let latencies: Vec<f64> = candidates
                    .iter()
                    .map(|p| scores.get(p.name()).map_or(0.0, |s| s.avg_latency_ms))
                    .collect();
                lowest_index(&latencies)
            }
            SelectionStrategy::RoundRobin => {
                self.round_robin.fetch_add(1, Ordering::Relaxed) % candidates.len()
            }
        };

        let chosen = candidates.swap_remove(index);
        debug!(
            "Routed {} query to '{}' ({} strategy)",
            query.asset,
            chosen.name(),
            self.config.strategy
        );
        Ok(chosen)
    }

    fn composite_scores(&self, candidates: &[Arc<dyn DataProvider>], query: &Query) -> Vec<f64> {
        candidates
            .iter()
            .map(|p| self.composite_score(p.as_ref(), query))
            .collect()
    }

    /// `performance - delay_penalty + capability_bonus` for one provider.
    pub fn composite_score(&self, provider: &dyn DataProvider, query: &Query) -> f64 {
        let performance = self
            .lock_scores()
            .get(provider.name())
            .map_or(self.config.initial_score, |s| s.score);

        let capability = provider.capability();
        let delay_penalty = (capability.data_delay_seconds as f64
            * self.config.delay_penalty_per_second)
            .min(self.config.max_delay_penalty);

        let mut bonus = 0.0;
        let symbols = query.symbol_count() as f64;
        if symbols <= capability.max_symbols_per_request as f64 * 0.1 {
            bonus += self.config.symbol_headroom_bonus;
        }
        if capability.supports_real_time && query.is_unbounded() {
            bonus += self.config.real_time_bonus;
        }

        performance - delay_penalty + bonus
    }

    /// Run `query` against up to `max_attempts` providers.
    ///
    /// Every provider error is handled the same way: the provider is
    /// penalized, marked unhealthy and the next candidate is tried.
    pub async fn execute_query(&self, query: &Query) -> Result<DataResponse, MarketDataError> {
        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<String> = None;

        self.revive_candidates(query).await;

        for attempt in 1..=self.config.max_attempts {
            let provider = match self.select_provider(query, &attempted) {
                Ok(provider) => provider,
                Err(e) => {
                    debug!("No further candidates on attempt {}: {}", attempt, e);
                    break;
                }
            };
            let name = provider.name().to_string();
            attempted.push(name.clone());

            let started = Instant::now();
            match provider.get_data(query).await {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.record_success(&name, latency_ms);
                    info!(
                        "Provider '{}' returned {} records in {:.1}ms",
                        name,
                        response.len(),
                        latency_ms
                    );
                    return Ok(response);
                }
                Err(e) => {
                    match e.retry_after() {
                        Some(after) => warn!(
                            "Provider '{}' failed on attempt {}/{} ({:?}, retry after {:?}): {}",
                            name,
                            attempt,
                            self.config.max_attempts,
                            e.retry_class(),
                            after,
                            e
                        ),
                        None => warn!(
                            "Provider '{}' failed on attempt {}/{} ({:?}): {}",
                            name,
                            attempt,
                            self.config.max_attempts,
                            e.retry_class(),
                            e
                        ),
                    }
                    self.record_failure(&name, &e);
                    self.registry.mark_unhealthy(&name);
                    // The failure stands as the cached health verdict until the
                    // health cache interval runs out.
                    if self.config.health_cache_interval.is_some() {
                        self.lock_health_cache().insert(
                            name.clone(),
                            HealthEntry {
                                healthy: false,
                                checked_at: Instant::now(),
                            },
                        );
                    }
                    last_error = Some(e.to_string());
                }
            }
        }

        error!(
            "No provider could serve {} query after trying [{}]",
            query.asset,
            attempted.join(", ")
        );
        Err(MarketDataError::NoProviderAvailable {
            asset: query.asset.to_string(),
            attempted,
            last_error,
        })
    }

    /// Re-check capable providers that are marked unhealthy and put the ones
    /// that pass back into rotation. Checks honor the health cache, so a
    /// provider that just failed waits out `health_cache_interval` first.
    async fn revive_candidates(&self, query: &Query) {
        let dormant: Vec<String> = self
            .registry
            .providers()
            .into_iter()
            .filter(|p| !self.registry.is_healthy(p.name()) && p.can_handle_query(query))
            .map(|p| p.name().to_string())
            .collect();
        if dormant.is_empty() {
            return;
        }

        let checks = dormant.into_iter().map(|name| async move {
            let _permit = self.health_permits.acquire().await.ok();
            let healthy = self.is_provider_healthy(&name).await;
            (name, healthy)
        });
        for (name, healthy) in join_all(checks).await {
            if healthy {
                info!("Provider '{}' passed its health check, back in rotation", name);
                self.registry.mark_healthy(&name);
            }
        }
    }

    // =========================================================================
    // Scores
    // =========================================================================

    pub fn record_success(&self, provider: &str, latency_ms: f64) {
        let mut scores = self.lock_scores();
        scores
            .entry(provider.to_string())
            .or_insert_with(|| ProviderScore::new(provider, self.config.initial_score))
            .record_success(latency_ms, &self.config);
    }

    pub fn record_failure(&self, provider: &str, error: &MarketDataError) {
        let mut scores = self.lock_scores();
        scores
            .entry(provider.to_string())
            .or_insert_with(|| ProviderScore::new(provider, self.config.initial_score))
            .record_failure(&error.to_string(), &self.config);
    }

    /// Score map with an entry for every registered provider.
    fn lock_seeded_scores(&self) -> MutexGuard<'_, HashMap<String, ProviderScore>> {
        let mut scores = self.lock_scores();
        for name in self.registry.provider_names() {
            if !scores.contains_key(&name) {
                let score = ProviderScore::new(&name, self.config.initial_score);
                scores.insert(name, score);
            }
        }
        scores
    }

    /// Snapshot of every provider score. Registered providers that have not
    /// been tried yet carry the initial score.
    pub fn provider_scores(&self) -> HashMap<String, ProviderScore> {
        self.lock_seeded_scores().clone()
    }

    /// Put every registered provider back to the initial score and forget
    /// providers that are no longer registered.
    pub fn reset_scores(&self) {
        self.lock_scores().clear();
        let seeded = self.lock_seeded_scores().len();
        info!("Provider scores reset ({} providers)", seeded);
    }

    /// Blend every score toward its recent window.
    pub fn apply_score_decay(&self) {
        let mut scores = self.lock_seeded_scores();
        for score in scores.values_mut() {
            score.apply_decay(&self.config);
        }
        debug!("Applied score decay to {} providers", scores.len());
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Health-check a provider, reusing a recent result while health caching is on.
    ///
    /// Unknown providers and checks that return an error are unhealthy.
    pub async fn is_provider_healthy(&self, name: &str) -> bool {
        if let Some(interval) = self.config.health_cache_interval {
            let cached = self.lock_health_cache().get(name).copied();
            if let Some(entry) = cached {
                if entry.checked_at.elapsed() < interval {
                    return entry.healthy;
                }
            }
        }

        let Some(provider) = self.registry.get(name) else {
            return false;
        };

        let healthy = match provider.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!("Health check for '{}' failed: {}", name, e);
                false
            }
        };

        if self.config.health_cache_interval.is_some() {
            self.lock_health_cache().insert(
                name.to_string(),
                HealthEntry {
                    healthy,
                    checked_at: Instant::now(),
                },
            );
        }
        healthy
    }

    /// Health-check every registered provider and record the results in the registry.
    ///
    /// At most `health_check_concurrency` checks run at once.
    pub async fn check_all_providers_health(&self) -> HashMap<String, bool> {
        let names = self.registry.provider_names();
        let checks = names.into_iter().map(|name| async move {
            let _permit = self.health_permits.acquire().await.ok();
            let healthy = self.is_provider_healthy(&name).await;
            (name, healthy)
        });

        let results: HashMap<String, bool> = join_all(checks).await.into_iter().collect();
        for (name, healthy) in &results {
            self.registry.set_health(name, *healthy);
        }

        let unhealthy = results.values().filter(|h| !**h).count();
        debug!(
            "Health sweep finished: {} providers, {} unhealthy",
            results.len(),
            unhealthy
        );
        results
    }

    // =========================================================================
    // Background tasks
    // =========================================================================

    /// Spawn the periodic score decay and health sweep loops.
    ///
    /// Calling this while the tasks already run does nothing. Must be called
    /// from within a tokio runtime.
    pub fn start_background_tasks(self: &Arc<Self>) {
        let mut background = self.lock_background();
        if background.is_some() {
            debug!("Router background tasks already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let decay = spawn_periodic(
            Arc::downgrade(self),
            self.config.decay_interval,
            shutdown_rx.clone(),
            |router| async move { router.apply_score_decay() },
        );
        let sweep = spawn_periodic(
            Arc::downgrade(self),
            self.config.health_sweep_interval,
            shutdown_rx,
            |router| async move {
                router.check_all_providers_health().await;
            },
        );

        info!(
            "Router background tasks started (decay every {:?}, health sweep every {:?})",
            self.config.decay_interval, self.config.health_sweep_interval
        );
        *background = Some(BackgroundTasks {
            shutdown_tx,
            handles: vec![decay, sweep],
        });
    }

    pub fn background_tasks_running(&self) -> bool {
        self.lock_background().is_some()
    }

    /// Stop the background loops and wait for them to finish. Idempotent.
    pub async fn shutdown(&self) {
        let Some(tasks) = self.lock_background().take() else {
            return;
        };

        let _ = tasks.shutdown_tx.send(true);
        for handle in tasks.handles {
            if let Err(e) = handle.await {
                warn!("Router background task ended abnormally: {}", e);
            }
        }
        info!("Router background tasks stopped");
    }
}

fn spawn_periodic<F, Fut>(
    router: Weak<DataRouter>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<DataRouter>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(router) = router.upgrade() else {
                        break;
                    };
                    job(router).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetType, DataPoint, Market, ProviderInfo, Timeframe};
    use crate::provider::ProviderCapability;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    struct MockProvider {
        name: &'static str,
        fail: bool,
        /// Number of leading `get_data` calls that fail
        fail_first: usize,
        rate_limited: bool,
        healthy: Result<bool, ()>,
        up: AtomicBool,
        delay_seconds: u32,
        calls: AtomicUsize,
        health_calls: AtomicUsize,
    }

    impl MockProvider {
        fn ok(name: &'static str) -> Self {
            Self {
                name,
                fail: false,
                fail_first: 0,
                rate_limited: false,
                healthy: Ok(true),
                up: AtomicBool::new(true),
                delay_seconds: 0,
                calls: AtomicUsize::new(0),
                health_calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::ok(name)
            }
        }
    }

    #[async_trait]
    impl DataProvider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn capability(&self) -> ProviderCapability {
            ProviderCapability {
                supported_assets: vec![AssetType::Stock],
                supported_markets: vec![Market::Cn],
                supported_timeframes: vec![Timeframe::Day1],
                data_delay_seconds: self.delay_seconds,
                ..ProviderCapability::default()
            }
        }

        async fn get_data(&self, query: &Query) -> Result<DataResponse, MarketDataError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.rate_limited {
                return Err(MarketDataError::RateLimited {
                    provider: self.name.to_string(),
                    retry_after: Some(std::time::Duration::from_secs(30)),
                });
            }
            if self.fail || call < self.fail_first {
                return Err(MarketDataError::ProviderError {
                    provider: self.name.to_string(),
                    message: "upstream unavailable".to_string(),
                });
            }
            let point = DataPoint::new("000001", chrono::Utc::now());
            Ok(DataResponse::new(
                vec![point],
                ProviderInfo::new(self.name),
                query.clone(),
            ))
        }

        async fn health_check(&self) -> Result<bool, MarketDataError> {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            self.healthy
                .map(|healthy| healthy && self.up.load(Ordering::SeqCst))
                .map_err(|_| MarketDataError::HealthCheckFailed {
                    provider: self.name.to_string(),
                    message: "health endpoint crashed".to_string(),
                })
        }
    }

    fn cn_query() -> Query {
        Query::new(AssetType::Stock)
            .with_market(Market::Cn)
            .with_symbols(["000001"])
            .with_timeframe(Timeframe::Day1)
    }

    fn seeded(seed: u64) -> RouterConfig {
        RouterConfig {
            rng_seed: Some(seed),
            ..RouterConfig::default()
        }
    }

    fn setup(providers: Vec<Arc<MockProvider>>, config: RouterConfig) -> DataRouter {
        let registry = Arc::new(ProviderRegistry::new());
        for provider in providers {
            registry.register(provider).unwrap();
        }
        DataRouter::with_config(registry, config)
    }

    #[tokio::test]
    async fn test_fallback_to_second_provider() {
        let a = Arc::new(MockProvider::failing("a"));
        let b = Arc::new(MockProvider::ok("b"));
        let router = setup(vec![a.clone(), b.clone()], seeded(1));

        // Hint forces "a" first; once it fails the hint no longer applies
        let query = cn_query().with_provider("a");
        let response = router.execute_query(&query).await.unwrap();

        assert_eq!(response.source.name, "b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);

        let scores = router.provider_scores();
        assert!(scores["a"].score < 1.0);
        assert!(scores["b"].score > 1.0);
        assert_eq!(scores["a"].consecutive_failures, 1);
        assert!(!router.registry().is_healthy("a"));
        assert!(router.registry().is_healthy("b"));
    }

    #[tokio::test]
    async fn test_rate_limited_provider_falls_through() {
        let a = Arc::new(MockProvider {
            rate_limited: true,
            ..MockProvider::ok("a")
        });
        let b = Arc::new(MockProvider::ok("b"));
        let router = setup(vec![a.clone(), b.clone()], seeded(4));

        let response = router
            .execute_query(&cn_query().with_provider("a"))
            .await
            .unwrap();

        assert_eq!(response.source.name, "b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.provider_scores()["a"].consecutive_failures, 1);
        assert!(!router.registry().is_healthy("a"));

        let lone = setup(
            vec![Arc::new(MockProvider {
                rate_limited: true,
                ..MockProvider::ok("a")
            })],
            seeded(4),
        );
        match lone.execute_query(&cn_query()).await.unwrap_err() {
            MarketDataError::NoProviderAvailable { last_error, .. } => {
                assert!(last_error.unwrap().contains("Rate limited: a"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_providers_fail() {
        let router = setup(
            vec![
                Arc::new(MockProvider::failing("a")),
                Arc::new(MockProvider::failing("b")),
            ],
            seeded(2),
        );

        let err = router.execute_query(&cn_query()).await.unwrap_err();
        match err {
            MarketDataError::NoProviderAvailable {
                asset,
                mut attempted,
                last_error,
            } => {
                assert_eq!(asset, "stock");
                attempted.sort();
                assert_eq!(attempted, vec!["a".to_string(), "b".to_string()]);
                assert!(last_error.unwrap().contains("upstream unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let providers: Vec<Arc<MockProvider>> = ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(|n| Arc::new(MockProvider::failing(n)))
            .collect();
        let router = setup(providers.clone(), seeded(3));

        let err = router.execute_query(&cn_query()).await.unwrap_err();
        let MarketDataError::NoProviderAvailable { attempted, .. } = err else {
            panic!("expected NoProviderAvailable");
        };
        assert_eq!(attempted.len(), 3);

        let total_calls: usize = providers.iter().map(|p| p.calls.load(Ordering::SeqCst)).sum();
        assert_eq!(total_calls, 3);
    }

    #[tokio::test]
    async fn test_no_candidate() {
        let router = setup(vec![Arc::new(MockProvider::ok("a"))], seeded(4));
        let bond_query = Query::new(AssetType::Bond);

        let err = router.route_query(&bond_query).err().unwrap();
        assert!(matches!(err, MarketDataError::NoProviderAvailable { .. }));
        assert!(err.to_string().contains("bond"));

        let err = router.execute_query(&bond_query).await.unwrap_err();
        assert!(err.to_string().contains("bond"));
    }

    #[tokio::test]
    async fn test_single_candidate_is_returned_directly() {
        let router = setup(vec![Arc::new(MockProvider::ok("only"))], seeded(5));
        assert_eq!(router.route_query(&cn_query()).unwrap().name(), "only");
    }

    #[tokio::test]
    async fn test_score_bias() {
        let router = setup(
            vec![Arc::new(MockProvider::ok("a")), Arc::new(MockProvider::ok("b"))],
            seeded(6),
        );
        for _ in 0..20 {
            router.record_success("a", 10.0);
            router.record_failure(
                "b",
                &MarketDataError::Timeout {
                    provider: "b".to_string(),
                },
            );
        }

        let mut picks_a = 0;
        for _ in 0..1000 {
            if router.route_query(&cn_query()).unwrap().name() == "a" {
                picks_a += 1;
            }
        }
        assert!(picks_a > 800, "a picked {picks_a} times");
        assert!(picks_a < 1000, "weighted selection must keep exploring");
    }

    #[tokio::test]
    async fn test_highest_score_strategy_is_deterministic() {
        let config = RouterConfig {
            strategy: SelectionStrategy::HighestScore,
            ..RouterConfig::default()
        };
        let router = setup(
            vec![Arc::new(MockProvider::ok("a")), Arc::new(MockProvider::ok("b"))],
            config,
        );
        router.record_success("b", 0.0);

        for _ in 0..10 {
            assert_eq!(router.route_query(&cn_query()).unwrap().name(), "b");
        }
    }

    #[tokio::test]
    async fn test_round_robin_strategy_rotates() {
        let config = RouterConfig {
            strategy: SelectionStrategy::RoundRobin,
            ..RouterConfig::default()
        };
        let router = setup(
            vec![Arc::new(MockProvider::ok("a")), Arc::new(MockProvider::ok("b"))],
            config,
        );
        let picks: Vec<String> = (0..4)
            .map(|_| router.route_query(&cn_query()).unwrap().name().to_string())
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_composite_score_components() {
        let slow = MockProvider {
            delay_seconds: 900,
            ..MockProvider::ok("slow")
        };
        let router = setup(vec![], seeded(7));

        // 1 symbol out of 100 earns the headroom bonus; delay penalty is capped
        let score = router.composite_score(&slow, &cn_query());
        assert!((score - (1.0 - 0.5 + 0.1)).abs() < 1e-9);

        let fresh = MockProvider::ok("fresh");
        let score = router.composite_score(&fresh, &cn_query());
        assert!((score - 1.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_health_cache_honored() {
        let provider = Arc::new(MockProvider::ok("a"));
        let router = setup(vec![provider.clone()], seeded(8));

        assert!(router.is_provider_healthy("a").await);
        assert!(router.is_provider_healthy("a").await);
        assert_eq!(provider.health_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_health_cache_holds_until_interval_expires() {
        let provider = Arc::new(MockProvider::ok("a"));
        let config = RouterConfig {
            health_cache_interval: Some(Duration::from_millis(50)),
            ..seeded(8)
        };
        let router = setup(vec![provider.clone()], config);

        assert!(router.is_provider_healthy("a").await);
        provider.up.store(false, Ordering::SeqCst);

        // Still the cached verdict
        assert!(router.is_provider_healthy("a").await);
        assert_eq!(provider.health_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(!router.is_provider_healthy("a").await);
        assert_eq!(provider.health_calls.load(Ordering::SeqCst), 2);

        provider.up.store(true, Ordering::SeqCst);
        assert!(!router.is_provider_healthy("a").await);
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(router.is_provider_healthy("a").await);
    }

    #[tokio::test]
    async fn test_failed_provider_rejoins_after_health_interval() {
        let provider = Arc::new(MockProvider {
            fail_first: 1,
            ..MockProvider::ok("flaky")
        });
        let config = RouterConfig {
            health_cache_interval: Some(Duration::from_millis(50)),
            ..seeded(16)
        };
        let router = setup(vec![provider.clone()], config);

        assert!(router.execute_query(&cn_query()).await.is_err());
        assert!(!router.registry().is_healthy("flaky"));

        // Inside the interval the failure is the cached verdict
        let err = router.execute_query(&cn_query()).await.unwrap_err();
        let MarketDataError::NoProviderAvailable { attempted, .. } = err else {
            panic!("expected NoProviderAvailable");
        };
        assert!(attempted.is_empty());
        assert_eq!(provider.health_calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(70)).await;
        let response = router.execute_query(&cn_query()).await.unwrap();
        assert_eq!(response.source.name, "flaky");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.health_calls.load(Ordering::SeqCst), 1);
        assert!(router.registry().is_healthy("flaky"));
    }

    #[tokio::test]
    async fn test_failed_provider_rejoins_without_health_cache() {
        let provider = Arc::new(MockProvider {
            fail_first: 1,
            ..MockProvider::ok("flaky")
        });
        let config = RouterConfig {
            health_cache_interval: None,
            ..seeded(17)
        };
        let router = setup(vec![provider.clone()], config);

        assert!(router.execute_query(&cn_query()).await.is_err());
        assert!(router.execute_query(&cn_query()).await.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unhealthy_provider_stays_out_when_check_fails() {
        let provider = Arc::new(MockProvider {
            healthy: Ok(false),
            ..MockProvider::failing("down")
        });
        let config = RouterConfig {
            health_cache_interval: None,
            ..seeded(18)
        };
        let router = setup(vec![provider.clone()], config);

        assert!(router.execute_query(&cn_query()).await.is_err());
        assert!(router.execute_query(&cn_query()).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!router.registry().is_healthy("down"));
    }

    #[tokio::test]
    async fn test_health_cache_disabled() {
        let provider = Arc::new(MockProvider::ok("a"));
        let config = RouterConfig {
            health_cache_interval: None,
            ..seeded(9)
        };
        let router = setup(vec![provider.clone()], config);

        assert!(router.is_provider_healthy("a").await);
        assert!(router.is_provider_healthy("a").await);
        assert_eq!(provider.health_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_health_check_error_counts_as_unhealthy() {
        let provider = Arc::new(MockProvider {
            healthy: Err(()),
            ..MockProvider::ok("flaky")
        });
        let router = setup(vec![provider], seeded(10));

        assert!(!router.is_provider_healthy("flaky").await);
        assert!(!router.is_provider_healthy("missing").await);
    }

    #[tokio::test]
    async fn test_check_all_providers_updates_registry() {
        let good = Arc::new(MockProvider::ok("good"));
        let bad = Arc::new(MockProvider {
            healthy: Ok(false),
            ..MockProvider::ok("bad")
        });
        let router = setup(vec![good, bad], seeded(11));
        router.registry().mark_unhealthy("good");

        let results = router.check_all_providers_health().await;
        assert_eq!(results.get("good"), Some(&true));
        assert_eq!(results.get("bad"), Some(&false));
        assert!(router.registry().is_healthy("good"));
        assert!(!router.registry().is_healthy("bad"));
    }

    struct SlowHealthCheck {
        name: String,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DataProvider for SlowHealthCheck {
        fn name(&self) -> &str {
            &self.name
        }

        fn capability(&self) -> ProviderCapability {
            ProviderCapability::default()
        }

        async fn get_data(&self, _query: &Query) -> Result<DataResponse, MarketDataError> {
            Err(MarketDataError::ProviderError {
                provider: self.name.clone(),
                message: "unused".to_string(),
            })
        }

        async fn health_check(&self) -> Result<bool, MarketDataError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_health_sweep_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(ProviderRegistry::new());
        for i in 0..12 {
            registry
                .register(Arc::new(SlowHealthCheck {
                    name: format!("p{i}"),
                    in_flight: in_flight.clone(),
                    peak: peak.clone(),
                }))
                .unwrap();
        }
        let router = DataRouter::with_config(registry, seeded(12));

        let results = router.check_all_providers_health().await;
        assert_eq!(results.len(), 12);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak concurrency {peak}");
        assert!(peak > 1, "health checks should overlap");
    }

    #[tokio::test]
    async fn test_score_decay_and_reset() {
        let router = setup(vec![Arc::new(MockProvider::ok("a"))], seeded(13));
        for _ in 0..5 {
            router.record_failure(
                "a",
                &MarketDataError::Timeout {
                    provider: "a".to_string(),
                },
            );
        }
        let before = router.provider_scores()["a"].score;
        router.apply_score_decay();
        let after = router.provider_scores()["a"].score;
        assert!(after > before, "decay should pull {before} toward 0.8");

        router.reset_scores();
        let scores = router.provider_scores();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["a"].score, 1.0);
        assert_eq!(scores["a"].total_requests, 0);
    }

    #[tokio::test]
    async fn test_registered_providers_have_scores_before_first_use() {
        let router = setup(
            vec![Arc::new(MockProvider::ok("a")), Arc::new(MockProvider::ok("b"))],
            seeded(19),
        );

        let scores = router.provider_scores();
        assert_eq!(scores.len(), 2);
        assert!(scores.values().all(|s| s.score == 1.0 && s.total_requests == 0));

        router.apply_score_decay();
        assert!((router.provider_scores()["b"].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_background_tasks_lifecycle() {
        let provider = Arc::new(MockProvider::ok("a"));
        let config = RouterConfig {
            decay_interval: Duration::from_millis(10),
            health_sweep_interval: Duration::from_millis(10),
            health_cache_interval: None,
            ..seeded(14)
        };
        let router = Arc::new(setup(vec![provider.clone()], config));
        router.registry().mark_unhealthy("a");

        router.start_background_tasks();
        router.start_background_tasks();
        assert!(router.background_tasks_running());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(router.registry().is_healthy("a"));
        assert!(provider.health_calls.load(Ordering::SeqCst) >= 1);

        router.shutdown().await;
        assert!(!router.background_tasks_running());
        router.shutdown().await;

        let calls = provider.health_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(provider.health_calls.load(Ordering::SeqCst), calls);
    }
}
