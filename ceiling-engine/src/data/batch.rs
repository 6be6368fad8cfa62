//! Concurrent batch fetching of series and profiles.
//!
//! Runs one task per symbol on a bounded worker pool. The aggregate request
//! rate still obeys each provider's limiter because every call goes through
//! the router.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::router::DataProviderRouter;
use super::{CompanyProfile, PriceSeries};

/// Batch fetch settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Symbols fetched concurrently
    pub max_concurrency: usize,
    /// Daily bars requested per symbol
    pub bars_limit: usize,
    /// Whether to request company profiles
    pub fetch_profiles: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            bars_limit: 60,
            fetch_profiles: true,
        }
    }
}

/// Everything fetched for one symbol.
#[derive(Debug, Clone)]
pub struct SymbolData {
    pub series: PriceSeries,
    pub profile: CompanyProfile,
}

/// Result of fetching one symbol.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Data(SymbolData),
    NoData { symbol: String, reason: String },
}

impl FetchOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Data(data) => data.series.symbol(),
            Self::NoData { symbol, .. } => symbol,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }
}

/// Fetches many symbols through the router with bounded concurrency.
pub struct BatchFetcher {
    router: Arc<DataProviderRouter>,
    config: BatchConfig,
}

impl BatchFetcher {
    pub fn new(router: Arc<DataProviderRouter>, config: BatchConfig) -> Self {
        Self { router, config }
    }

    /// Fetch every symbol; outcomes come back in input order.
    ///
    /// One symbol's failure never aborts the batch. A failed profile fetch
    /// degrades to an unknown profile rather than a no-data outcome.
    pub async fn fetch_all(&self, symbols: &[String]) -> Vec<FetchOutcome> {
        let started = Instant::now();
        let workers = self.config.max_concurrency.max(1);

        let mut indexed: Vec<(usize, FetchOutcome)> = stream::iter(symbols.iter().enumerate())
            .map(|(index, symbol)| async move { (index, self.fetch_one(symbol).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<FetchOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

        let fetched = outcomes.iter().filter(|o| o.is_data()).count();
        info!(
            requested = symbols.len(),
            fetched,
            missing = symbols.len() - fetched,
            workers,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch fetch complete"
        );

        outcomes
    }

    /// Fetch series and profile for one symbol.
    pub async fn fetch_one(&self, symbol: &str) -> FetchOutcome {
        let series = match self.router.get_daily_bars(symbol, self.config.bars_limit).await {
            Ok(series) => series,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "No data for symbol");
                return FetchOutcome::NoData {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                };
            }
        };

        let profile = if self.config.fetch_profiles {
            match self.router.get_company_profile(symbol).await {
                Ok(profile) => profile,
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "Profile unavailable, using unknown");
                    CompanyProfile::unknown(symbol)
                }
            }
        } else {
            CompanyProfile::unknown(symbol)
        };

        FetchOutcome::Data(SymbolData { series, profile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::InMemoryProvider;
    use crate::data::test_support::series_from;

    async fn router_with(provider: InMemoryProvider) -> Arc<DataProviderRouter> {
        let router = Arc::new(DataProviderRouter::new());
        router.register(Arc::new(provider)).await;
        router
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order_and_isolates_failures() {
        let provider = InMemoryProvider::new("mem", 1)
            .with_series(series_from("AAA", &[1.0, 1.1], &[10.0, 20.0]))
            .with_series(series_from("CCC", &[2.0, 2.2], &[10.0, 20.0]));
        let fetcher = BatchFetcher::new(router_with(provider).await, BatchConfig::default());

        let symbols = vec!["CCC".to_string(), "BBB".to_string(), "AAA".to_string()];
        let outcomes = fetcher.fetch_all(&symbols).await;

        let order: Vec<_> = outcomes.iter().map(|o| o.symbol().to_string()).collect();
        assert_eq!(order, symbols);
        assert!(outcomes[0].is_data());
        assert!(matches!(&outcomes[1], FetchOutcome::NoData { symbol, .. } if symbol == "BBB"));
        assert!(outcomes[2].is_data());
    }

    #[tokio::test]
    async fn test_missing_profile_degrades_to_unknown() {
        let provider =
            InMemoryProvider::new("mem", 1).with_series(series_from("AAA", &[1.0], &[10.0]));
        let fetcher = BatchFetcher::new(router_with(provider).await, BatchConfig::default());

        match fetcher.fetch_one("AAA").await {
            FetchOutcome::Data(data) => {
                assert_eq!(data.profile, CompanyProfile::unknown("AAA"));
            }
            other => panic!("expected data, got {:?}", other),
        }
    }
}
