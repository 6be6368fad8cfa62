//! Integration tests for data source failover.
//!
//! Exercises the router through the public API with mock providers that
//! fail, flake, stall or throttle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use ceiling_engine::data::{
    shared_limiter, BatchConfig, BatchFetcher, Bar, DataCapabilities, DataProvider,
    DataProviderRouter, FetchOutcome, InMemoryProvider, PriceSeries, ProviderError,
    ProviderRegistration, RouterConfig,
};

// ============================================================================
// Mock Providers for Testing
// ============================================================================

fn flat_series(symbol: &str, days: usize) -> PriceSeries {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let bars = (0..days)
        .map(|i| Bar {
            timestamp: start + chrono::Duration::days(i as i64),
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close: 10.5,
            volume: 1000.0,
        })
        .collect();
    PriceSeries::new(symbol, bars).unwrap()
}

/// Mock provider that can be configured to succeed or fail
struct MockProvider {
    name: &'static str,
    priority: u8,
    error: Option<ProviderError>,
    calls: AtomicU32,
}

impl MockProvider {
    fn working(name: &'static str, priority: u8) -> Self {
        Self {
            name,
            priority,
            error: None,
            calls: AtomicU32::new(0),
        }
    }

    fn failing(name: &'static str, priority: u8, error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Self::working(name, priority)
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> DataCapabilities {
        DataCapabilities::daily_only()
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<PriceSeries, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(flat_series(symbol, limit.min(30))),
        }
    }
}

/// Mock provider that is throttled a fixed number of times then succeeds
struct ThrottledProvider {
    throttles_remaining: AtomicU32,
    calls: AtomicU32,
}

#[async_trait]
impl DataProvider for ThrottledProvider {
    fn name(&self) -> &str {
        "throttled"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn capabilities(&self) -> DataCapabilities {
        DataCapabilities::daily_only()
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        _limit: usize,
    ) -> Result<PriceSeries, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.throttles_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.throttles_remaining.fetch_sub(1, Ordering::Relaxed);
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(1),
            });
        }
        Ok(flat_series(symbol, 5))
    }
}

/// Provider that never answers within any sane timeout
struct StalledProvider;

#[async_trait]
impl DataProvider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn capabilities(&self) -> DataCapabilities {
        DataCapabilities::daily_only()
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        _limit: usize,
    ) -> Result<PriceSeries, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(flat_series(symbol, 1))
    }
}

// ============================================================================
// Failover Tests
// ============================================================================

#[tokio::test]
async fn test_failover_to_backup_provider() {
    let router = DataProviderRouter::with_config(RouterConfig {
        max_retries: 0,
        ..Default::default()
    });

    let failing = Arc::new(MockProvider::failing(
        "failing",
        1,
        ProviderError::Network("mock network failure".into()),
    ));
    let working = Arc::new(MockProvider::working("working", 2));
    router.register(failing.clone()).await;
    router.register(working.clone()).await;

    let series = router.get_daily_bars("THYAO", 20).await.unwrap();

    assert_eq!(series.len(), 20);
    assert_eq!(failing.call_count(), 1);
    assert_eq!(working.call_count(), 1);
}

#[tokio::test]
async fn test_all_providers_fail() {
    let router = DataProviderRouter::new();
    router
        .register(Arc::new(MockProvider::failing(
            "first",
            1,
            ProviderError::Unavailable("HTTP 503".into()),
        )))
        .await;
    router
        .register(Arc::new(MockProvider::failing(
            "second",
            2,
            ProviderError::Network("connection reset".into()),
        )))
        .await;

    match router.get_daily_bars("THYAO", 20).await {
        Err(ProviderError::AllProvidersFailed { attempts }) => {
            assert_eq!(attempts.len(), 2);
            assert!(attempts[0].starts_with("first"));
            assert!(attempts[1].starts_with("second"));
        }
        other => panic!("expected AllProvidersFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_providers_registered() {
    let router = DataProviderRouter::new();

    match router.get_daily_bars("THYAO", 20).await {
        Err(ProviderError::Unavailable(msg)) => assert!(msg.contains("No data providers")),
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_symbol_falls_through_to_next_source() {
    let router = DataProviderRouter::new();
    let primary = Arc::new(InMemoryProvider::new("primary", 1));
    let secondary =
        Arc::new(InMemoryProvider::new("secondary", 2).with_series(flat_series("EKIZ", 10)));
    router.register(primary).await;
    router.register(secondary).await;

    let series = router.get_daily_bars("EKIZ", 60).await.unwrap();
    assert_eq!(series.len(), 10);

    // No data is not a health problem
    let infos = router.providers_info().await;
    assert!(infos.iter().all(|p| p.healthy));
    assert!(infos.iter().all(|p| p.error_count == 0));
}

#[tokio::test]
async fn test_priority_ordering() {
    let router = DataProviderRouter::new();

    let low = Arc::new(MockProvider::working("low", 10));
    let high = Arc::new(MockProvider::working("high", 1));
    let mid = Arc::new(MockProvider::working("mid", 5));

    router.register(low.clone()).await;
    router.register(high.clone()).await;
    router.register(mid.clone()).await;

    router.get_daily_bars("THYAO", 10).await.unwrap();

    assert_eq!(high.call_count(), 1);
    assert_eq!(mid.call_count(), 0);
    assert_eq!(low.call_count(), 0);
}

#[tokio::test]
async fn test_disable_provider() {
    let router = DataProviderRouter::new();
    let provider = Arc::new(MockProvider::working("only", 1));
    router.register(provider.clone()).await;

    router.set_enabled("only", false).await;

    assert!(router.get_daily_bars("THYAO", 10).await.is_err());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_unhealthy_provider_demoted_behind_healthy_one() {
    let router = DataProviderRouter::with_config(RouterConfig {
        max_retries: 0,
        ..Default::default()
    });

    let flaky = Arc::new(MockProvider::failing(
        "flaky",
        1,
        ProviderError::Unavailable("HTTP 502".into()),
    ));
    let backup = Arc::new(MockProvider::working("backup", 2));
    router.register(flaky.clone()).await;
    router.register(backup.clone()).await;

    for _ in 0..10 {
        router.get_daily_bars("THYAO", 10).await.unwrap();
    }

    // Once marked unhealthy the primary is only tried after the backup
    assert!(flaky.call_count() < 10);
    assert_eq!(backup.call_count(), 10);
}

// ============================================================================
// Throttling and Timeouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limited_response_is_retried_on_same_provider() {
    let router = DataProviderRouter::with_config(RouterConfig {
        max_retries: 2,
        ..Default::default()
    });
    let throttled = Arc::new(ThrottledProvider {
        throttles_remaining: AtomicU32::new(1),
        calls: AtomicU32::new(0),
    });
    let backup = Arc::new(MockProvider::working("backup", 5));
    router.register(throttled.clone()).await;
    router.register(backup.clone()).await;

    let series = router.get_daily_bars("THYAO", 5).await.unwrap();

    assert_eq!(series.len(), 5);
    assert_eq!(throttled.calls.load(Ordering::Relaxed), 2);
    assert_eq!(backup.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_provider_times_out_and_fails_over() {
    let router = DataProviderRouter::new();
    router
        .register_with(
            ProviderRegistration::new(Arc::new(StalledProvider))
                .with_timeout(Duration::from_secs(2)),
        )
        .await;
    let backup = Arc::new(MockProvider::working("backup", 2));
    router.register(backup.clone()).await;

    let series = router.get_daily_bars("THYAO", 3).await.unwrap();

    assert_eq!(series.len(), 3);
    let infos = router.providers_info().await;
    let stalled = infos.iter().find(|p| p.name == "stalled").unwrap();
    assert_eq!(stalled.error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_limiter_spaces_out_calls() {
    let router = DataProviderRouter::new();
    let provider = Arc::new(MockProvider::working("limited", 1));
    router
        .register_with(
            ProviderRegistration::new(provider.clone()).with_limiter(shared_limiter(
                "limited",
                2,
                Duration::from_secs(60),
            )),
        )
        .await;

    let start = tokio::time::Instant::now();
    for _ in 0..3 {
        router.get_daily_bars("THYAO", 5).await.unwrap();
    }

    // The third call waits for the first to leave the window
    assert!(start.elapsed() >= Duration::from_secs(60));
    assert_eq!(provider.call_count(), 3);
}

// ============================================================================
// Batch Fetching
// ============================================================================

#[tokio::test]
async fn test_batch_keeps_input_order_and_isolates_failures() {
    let router = Arc::new(DataProviderRouter::new());
    router
        .register(Arc::new(
            InMemoryProvider::new("memory", 1)
                .with_series(flat_series("AAA", 30))
                .with_series(flat_series("CCC", 30)),
        ))
        .await;

    let fetcher = BatchFetcher::new(
        router,
        BatchConfig {
            max_concurrency: 2,
            bars_limit: 20,
            fetch_profiles: true,
        },
    );
    let symbols: Vec<String> = ["AAA", "BBB", "CCC"].iter().map(|s| s.to_string()).collect();
    let outcomes = fetcher.fetch_all(&symbols).await;

    let order: Vec<_> = outcomes.iter().map(|o| o.symbol().to_string()).collect();
    assert_eq!(order, vec!["AAA", "BBB", "CCC"]);

    match &outcomes[0] {
        FetchOutcome::Data(data) => {
            assert_eq!(data.series.len(), 20);
            // Profile missing everywhere: unknown, not a failure
            assert!(data.profile.market_cap.is_none());
        }
        other => panic!("expected data for AAA, got {:?}", other),
    }
    assert!(!outcomes[1].is_data());
    assert!(outcomes[2].is_data());
}

#[tokio::test]
async fn test_market_context_defaults_to_flat_when_index_missing() {
    let router = DataProviderRouter::new();
    router.register(Arc::new(InMemoryProvider::new("memory", 1))).await;

    let context = router.get_market_context(Some("XU100"), 0.8).await;
    assert_eq!(context.index_change_pct, 0.0);
    assert_eq!(context.sentiment, 0.8);
}
