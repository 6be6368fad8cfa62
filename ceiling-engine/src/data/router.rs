//! Data provider router for multi-source failover.
//!
//! Routes requests to providers in priority order, throttles each one
//! through its own rate limiter and fails over to backup providers on
//! errors.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::health::{HealthMonitor, HealthMonitorConfig, Outcome, Standing};
use super::provider::{DataProvider, ProviderError, ProviderInfo};
use super::rate_limiter::SharedRateLimiter;
use super::{CompanyProfile, MarketContext, PriceSeries};

// ============================================================================
// Router Configuration
// ============================================================================

/// Configuration for the data provider router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum retries per provider after a rate-limit response
    pub max_retries: u32,
    /// Wait used when a rate-limit response carries no retry hint
    pub default_retry_after_secs: u64,
    /// Per-request timeout for providers registered without one
    pub request_timeout: Duration,
    /// Health monitor configuration
    pub health_config: HealthMonitorConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            default_retry_after_secs: 5,
            request_timeout: Duration::from_secs(30),
            health_config: HealthMonitorConfig::default(),
        }
    }
}

// ============================================================================
// Provider Registration
// ============================================================================

/// A provider plus the routing settings it is registered with.
pub struct ProviderRegistration {
    provider: Arc<dyn DataProvider>,
    priority: Option<u8>,
    limiter: Option<SharedRateLimiter>,
    timeout: Option<Duration>,
}

impl ProviderRegistration {
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self {
            provider,
            priority: None,
            limiter: None,
            timeout: None,
        }
    }

    /// Override the provider's own priority (lower = tried first).
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Throttle every call through this limiter.
    pub fn with_limiter(mut self, limiter: SharedRateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A registered provider with its routing metadata.
struct ProviderEntry {
    provider: Arc<dyn DataProvider>,
    priority: u8,
    limiter: Option<SharedRateLimiter>,
    timeout: Duration,
    enabled: bool,
}

/// Snapshot of one entry taken for the duration of a request.
#[derive(Clone)]
struct Route {
    provider: Arc<dyn DataProvider>,
    limiter: Option<SharedRateLimiter>,
    timeout: Duration,
}

// ============================================================================
// Data Provider Router
// ============================================================================

/// Routes data requests to providers with automatic failover.
///
/// Healthy providers are tried in priority order; providers that are
/// unhealthy or cooling down after a rate limit are tried last.
pub struct DataProviderRouter {
    /// Registered providers sorted by priority
    providers: RwLock<Vec<ProviderEntry>>,
    /// Health monitor
    health_monitor: Arc<HealthMonitor>,
    /// Configuration
    config: RouterConfig,
}

impl DataProviderRouter {
    /// Create a new router with default configuration
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration
    pub fn with_config(config: RouterConfig) -> Self {
        let health_monitor = Arc::new(HealthMonitor::with_config(config.health_config.clone()));

        Self {
            providers: RwLock::new(Vec::new()),
            health_monitor,
            config,
        }
    }

    /// Register a provider with its own priority and no rate limiter.
    pub async fn register(&self, provider: Arc<dyn DataProvider>) {
        self.register_with(ProviderRegistration::new(provider)).await;
    }

    /// Register a provider with explicit routing settings.
    ///
    /// Providers are ordered by configured priority, then the provider's own
    /// priority, then name.
    pub async fn register_with(&self, registration: ProviderRegistration) {
        let name = registration.provider.name().to_string();
        let priority = registration
            .priority
            .unwrap_or_else(|| registration.provider.priority());

        self.health_monitor.register_provider(&name).await;

        let mut providers = self.providers.write().await;
        providers.push(ProviderEntry {
            provider: registration.provider,
            priority,
            limiter: registration.limiter,
            timeout: registration.timeout.unwrap_or(self.config.request_timeout),
            enabled: true,
        });

        providers.sort_by(|a, b| {
            (a.priority, a.provider.priority(), a.provider.name())
                .cmp(&(b.priority, b.provider.priority(), b.provider.name()))
        });

        info!(provider = %name, priority, "Registered data provider");
    }

    /// Enable or disable a provider
    pub async fn set_enabled(&self, name: &str, enabled: bool) {
        let mut providers = self.providers.write().await;
        if let Some(entry) = providers.iter_mut().find(|e| e.provider.name() == name) {
            entry.enabled = enabled;
            info!(provider = name, enabled, "Provider enabled status changed");
        }
    }

    /// Number of registered providers
    pub async fn provider_count(&self) -> usize {
        self.providers.read().await.len()
    }

    /// Get information about all registered providers
    pub async fn providers_info(&self) -> Vec<ProviderInfo> {
        let providers = self.providers.read().await;
        let mut infos = Vec::with_capacity(providers.len());

        for entry in providers.iter() {
            let health = self.health_monitor.get_health(entry.provider.name()).await;
            let healthy = health.as_ref().map(|h| h.healthy).unwrap_or(false);

            let mut info =
                ProviderInfo::from_provider(entry.provider.as_ref(), entry.priority, healthy);
            info.rate_limit = entry
                .limiter
                .as_ref()
                .map(|l| (l.limit().0, l.limit().1.as_secs()));
            if let Some(h) = health {
                info.last_success = h.last_served;
                info.last_error = h.last_error.clone();
                info.request_count = h.requests;
                info.error_count = h.error_count();
            }
            infos.push(info);
        }

        infos
    }

    /// Check every enabled provider once and return the refreshed info.
    pub async fn run_health_checks(&self) -> Vec<ProviderInfo> {
        let routes: Vec<Route> = {
            let providers = self.providers.read().await;
            providers.iter().filter(|e| e.enabled).map(Self::route).collect()
        };

        for route in &routes {
            if let Some(limiter) = &route.limiter {
                limiter.acquire().await;
            }
            let healthy = self.health_monitor.check_provider(route.provider.as_ref()).await;
            debug!(provider = route.provider.name(), healthy, "Health check complete");
        }

        self.providers_info().await
    }

    // ========================================================================
    // Data Operations
    // ========================================================================

    /// Fetch up to `limit` daily bars with failover.
    ///
    /// An empty series counts as a provider failure.
    pub async fn get_daily_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<PriceSeries, ProviderError> {
        if symbol.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("empty symbol".into()));
        }

        self.execute_with_failover("daily_bars", |provider| {
            let symbol = symbol.to_string();
            async move {
                let series = provider.get_daily_bars(&symbol, limit).await?;
                if series.is_empty() {
                    return Err(ProviderError::DataNotAvailable(format!(
                        "empty series for {}",
                        symbol
                    )));
                }
                Ok(series.tail(limit))
            }
        })
        .await
    }

    /// Fetch a company profile with failover.
    pub async fn get_company_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        self.execute_with_failover("company_profile", |provider| {
            let symbol = symbol.to_string();
            async move { provider.get_company_profile(&symbol).await }
        })
        .await
    }

    /// Build the market context from the index's latest daily change.
    ///
    /// A missing index symbol or a failed fetch yields a flat index.
    pub async fn get_market_context(
        &self,
        index_symbol: Option<&str>,
        sentiment: f64,
    ) -> MarketContext {
        let Some(index) = index_symbol else {
            return MarketContext::new(0.0, sentiment);
        };

        match self.get_daily_bars(index, 2).await {
            Ok(series) => {
                let bars = series.bars();
                let change = match bars {
                    [.., prev, last] => last.change_pct_from(prev.close),
                    _ => 0.0,
                };
                info!(index = %index, change_pct = change, "Market context loaded");
                MarketContext::new(change, sentiment)
            }
            Err(e) => {
                warn!(index = %index, error = %e, "Index fetch failed, assuming flat market");
                MarketContext::new(0.0, sentiment)
            }
        }
    }

    // ========================================================================
    // Routing
    // ========================================================================

    fn route(entry: &ProviderEntry) -> Route {
        Route {
            provider: Arc::clone(&entry.provider),
            limiter: entry.limiter.clone(),
            timeout: entry.timeout,
        }
    }

    /// Enabled providers: healthy ones first, then the rest, each group in
    /// priority order.
    async fn ordered_routes(&self) -> Vec<Route> {
        let providers = self.providers.read().await;
        let mut preferred = Vec::new();
        let mut last_resort = Vec::new();

        for entry in providers.iter().filter(|e| e.enabled) {
            match self.health_monitor.standing(entry.provider.name()).await {
                Standing::Preferred => preferred.push(Self::route(entry)),
                Standing::LastResort => last_resort.push(Self::route(entry)),
            }
        }

        preferred.extend(last_resort);
        preferred
    }

    /// Execute a request with automatic failover.
    ///
    /// Each attempt first waits on the provider's limiter, then runs under
    /// the provider's timeout. Rate-limit responses are retried on the same
    /// provider after the advertised wait; invalid requests abort at once;
    /// every other error moves on to the next provider.
    async fn execute_with_failover<T, F, Fut>(
        &self,
        operation: &str,
        request_fn: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn(Arc<dyn DataProvider>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let routes = self.ordered_routes().await;
        if routes.is_empty() {
            return Err(ProviderError::Unavailable(
                "No data providers registered".into(),
            ));
        }

        let mut attempts = Vec::new();

        for route in routes {
            let name = route.provider.name().to_string();
            debug!(provider = %name, operation, "Routing request to provider");

            for attempt in 0..=self.config.max_retries {
                if attempt > 0 {
                    debug!(provider = %name, attempt, "Retrying request");
                }

                if let Some(limiter) = &route.limiter {
                    limiter.acquire().await;
                }

                let result =
                    match tokio::time::timeout(route.timeout, request_fn(Arc::clone(&route.provider)))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout),
                    };

                match result {
                    Ok(value) => {
                        self.health_monitor.record(&name, Outcome::Served).await;
                        return Ok(value);
                    }
                    Err(ProviderError::RateLimited { retry_after_secs }) => {
                        let wait_secs =
                            retry_after_secs.unwrap_or(self.config.default_retry_after_secs);
                        self.health_monitor
                            .record(&name, Outcome::Throttled { retry_after_secs: wait_secs })
                            .await;

                        if attempt < self.config.max_retries {
                            debug!(provider = %name, wait_secs, "Rate limited, waiting");
                            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                            continue;
                        }

                        warn!(provider = %name, operation, "Rate limit retries exhausted");
                        attempts.push(format!(
                            "{}: {}",
                            name,
                            ProviderError::RateLimited { retry_after_secs }
                        ));
                    }
                    Err(e) if !e.should_failover() => {
                        self.health_monitor
                            .record(&name, Outcome::Failed(&e.to_string()))
                            .await;
                        return Err(e);
                    }
                    Err(e) => {
                        // A symbol missing on one source says nothing about its health
                        if matches!(e, ProviderError::DataNotAvailable(_)) {
                            debug!(provider = %name, error = %e, "No data, trying next provider");
                        } else {
                            self.health_monitor
                                .record(&name, Outcome::Failed(&e.to_string()))
                                .await;
                            warn!(
                                provider = %name,
                                operation,
                                error = %e,
                                "Provider error, failing over to next provider"
                            );
                        }
                        attempts.push(format!("{}: {}", name, e));
                    }
                }
                break;
            }
        }

        Err(ProviderError::AllProvidersFailed { attempts })
    }
}

impl Default for DataProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::InMemoryProvider;
    use crate::data::provider::DataCapabilities;
    use crate::data::test_support::series_from;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingProvider {
        name: &'static str,
        error: ProviderError,
        calls: AtomicU32,
    }

    impl FailingProvider {
        fn new(name: &'static str, error: ProviderError) -> Self {
            Self {
                name,
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DataProvider for FailingProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u8 {
            1
        }

        fn capabilities(&self) -> DataCapabilities {
            DataCapabilities::daily_only()
        }

        async fn health_check(&self) -> Result<(), ProviderError> {
            Err(self.error.clone())
        }

        async fn get_daily_bars(
            &self,
            _symbol: &str,
            _limit: usize,
        ) -> Result<PriceSeries, ProviderError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(self.error.clone())
        }
    }

    fn working(name: &str, priority: u8) -> Arc<InMemoryProvider> {
        Arc::new(
            InMemoryProvider::new(name, priority)
                .with_series(series_from("THYAO", &[10.0, 10.5, 11.0], &[100.0; 3])),
        )
    }

    #[tokio::test]
    async fn test_router_priority_ordering() {
        let router = DataProviderRouter::new();
        router.register(working("low", 10)).await;
        router.register(working("high", 1)).await;
        router
            .register_with(ProviderRegistration::new(working("override", 20)).with_priority(5))
            .await;

        let infos = router.providers_info().await;
        let names: Vec<_> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["high", "override", "low"]);
        assert_eq!(infos[1].priority, 5);
    }

    #[tokio::test]
    async fn test_router_name_breaks_priority_ties() {
        let router = DataProviderRouter::new();
        router.register(working("bravo", 1)).await;
        router.register(working("alpha", 1)).await;

        let infos = router.providers_info().await;
        assert_eq!(infos[0].name, "alpha");
    }

    #[tokio::test]
    async fn test_router_failover() {
        let router = DataProviderRouter::new();
        let failing = Arc::new(FailingProvider::new(
            "failing",
            ProviderError::Network("down".into()),
        ));
        router.register(failing.clone()).await;
        router.register(working("working", 2)).await;

        let series = router.get_daily_bars("THYAO", 60).await.unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(failing.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_does_not_fail_over() {
        let router = DataProviderRouter::new();
        router
            .register(Arc::new(FailingProvider::new(
                "strict",
                ProviderError::InvalidRequest("bad symbol".into()),
            )))
            .await;
        router.register(working("working", 2)).await;

        let result = router.get_daily_bars("THYAO", 60).await;
        assert!(matches!(result, Err(ProviderError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_all_providers_failed_lists_attempts() {
        let router = DataProviderRouter::new();
        router
            .register(Arc::new(FailingProvider::new("a", ProviderError::Timeout)))
            .await;
        router
            .register(Arc::new(FailingProvider::new(
                "b",
                ProviderError::Malformed("bad".into()),
            )))
            .await;

        match router.get_daily_bars("THYAO", 60).await {
            Err(ProviderError::AllProvidersFailed { attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("a:"));
            }
            other => panic!("expected AllProvidersFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_providers_registered() {
        let router = DataProviderRouter::new();
        assert!(matches!(
            router.get_daily_bars("THYAO", 60).await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_provider_is_skipped() {
        let router = DataProviderRouter::new();
        router.register(working("only", 1)).await;
        router.set_enabled("only", false).await;

        assert!(router.get_daily_bars("THYAO", 60).await.is_err());
    }

    #[tokio::test]
    async fn test_market_context_from_index() {
        let router = DataProviderRouter::new();
        let provider = InMemoryProvider::new("mem", 1)
            .with_series(series_from("XU100", &[100.0, 98.0], &[1.0, 1.0]));
        router.register(Arc::new(provider)).await;

        let ctx = router.get_market_context(Some("XU100"), 0.8).await;
        assert!((ctx.index_change_pct + 2.0).abs() < 0.001);
        assert!((ctx.sentiment - 0.8).abs() < 0.001);

        let flat = router.get_market_context(Some("MISSING"), 0.5).await;
        assert_eq!(flat.index_change_pct, 0.0);

        let none = router.get_market_context(None, 0.3).await;
        assert_eq!(none.index_change_pct, 0.0);
    }

    #[tokio::test]
    async fn test_run_health_checks_marks_failures() {
        let router = DataProviderRouter::with_config(RouterConfig {
            health_config: HealthMonitorConfig {
                unhealthy_threshold: 1,
                check_timeout_secs: 1,
            },
            ..Default::default()
        });
        router
            .register(Arc::new(FailingProvider::new(
                "down",
                ProviderError::Unavailable("maintenance".into()),
            )))
            .await;
        router.register(working("up", 2)).await;

        let infos = router.run_health_checks().await;
        let down = infos.iter().find(|i| i.name == "down").unwrap();
        let up = infos.iter().find(|i| i.name == "up").unwrap();
        assert!(!down.healthy);
        assert!(up.healthy);
    }
}
