//! Ceiling Engine
//!
//! Scans a universe of listed equities and estimates, for each one, the
//! likelihood of a daily price-limit ("ceiling") event on the next session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         ceiling-engine                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐                │
//! │  │    data     │──▶│ indicators  │──▶│   scorer    │──┐             │
//! │  │ (failover)  │   │             │   │ (weighted)  │  │             │
//! │  └─────────────┘   └──────┬──────┘   └─────────────┘  ▼             │
//! │                           │          ┌─────────────┐ ┌───────────┐  │
//! │                           └─────────▶│    model    │▶│  scanner  │  │
//! │                                      │ (ensemble / │ │ (report)  │  │
//! │                                      │  heuristic) │ └───────────┘  │
//! │                                      └─────────────┘                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`data`]: bar series, profiles and market context from multiple
//!   providers with rate limiting, health tracking and failover
//! - [`indicators`]: momentum, trend, volatility and volume indicators
//!   with neutral defaults for short history
//! - [`scorer`]: five-block weighted score and risk tiers
//! - [`model`]: trained ensemble with a rule-based fallback
//! - [`scanner`]: universe scan, ranking and reports

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod indicators;
pub mod model;
pub mod scanner;
pub mod scorer;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use ceiling_common::config::Config;
use ceiling_common::{ProviderKind, ProviderSettings};

use crate::data::{
    shared_limiter, AlphaVantageProvider, BatchConfig, BatchFetcher, DataProvider,
    DataProviderRouter, FetchOutcome, InMemoryProvider, ProviderInfo, ProviderRegistration,
    TwelveDataProvider,
};
use crate::model::{
    build_training_set, EnsembleModel, FallbackPredictor, JsonFileModelStore, LabelConfig,
    ModelArtifact, ModelStore, SymbolSets, TrainingParams, TrainingReport,
};
use crate::scanner::{RankedReport, ScanConfig, ScanEngine};
use crate::scorer::{ScorerConfig, ScorerPreset, SignalScorer};

/// Daily bars requested per symbol when building a training set.
const TRAINING_BARS: usize = 500;

/// Wires configuration, providers and the model store together.
pub struct CeilingService {
    config: Config,
    router: Arc<DataProviderRouter>,
    store: Arc<dyn ModelStore>,
}

impl CeilingService {
    /// Build the service, registering every enabled provider from the config.
    pub async fn from_config(config: Config) -> Result<Self> {
        let router = Arc::new(DataProviderRouter::new());
        for settings in config.enabled_providers() {
            match build_provider(settings)? {
                Some(provider) => {
                    let (calls, window) = settings.rate_limit();
                    let mut registration = ProviderRegistration::new(provider)
                        .with_limiter(shared_limiter(
                            settings.name.clone(),
                            calls,
                            Duration::from_secs(window),
                        ))
                        .with_timeout(Duration::from_secs(settings.timeout_secs));
                    if let Some(priority) = settings.priority {
                        registration = registration.with_priority(priority);
                    }
                    router.register_with(registration).await;
                }
                None => warn!(provider = %settings.name, "Provider skipped: no API key"),
            }
        }

        if router.provider_count().await == 0 {
            warn!("No data providers registered; scans will fail");
        }

        let store: Arc<dyn ModelStore> = Arc::new(JsonFileModelStore::new(config.model.model_dir()));
        Ok(Self::with_parts(config, router, store))
    }

    /// Build from preassembled parts.
    pub fn with_parts(
        config: Config,
        router: Arc<DataProviderRouter>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        Self {
            config,
            router,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> Arc<DataProviderRouter> {
        Arc::clone(&self.router)
    }

    /// Predictor backed by the stored model, or the heuristic alone when
    /// none can be loaded.
    pub fn load_predictor(&self) -> FallbackPredictor {
        match self.store.load(&self.config.model.name) {
            Ok(artifact) => {
                info!(model = %artifact.name, created_at = %artifact.created_at, "Loaded trained model");
                FallbackPredictor::new(Some(artifact.model))
            }
            Err(e) if e.is_not_found() => {
                info!(model = %self.config.model.name, "No trained model, using heuristic");
                FallbackPredictor::heuristic_only()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load model, using heuristic");
                FallbackPredictor::heuristic_only()
            }
        }
    }

    /// Scan engine for the configured settings; `preset` overrides the
    /// configured scorer preset.
    pub fn scan_engine(&self, preset: Option<&str>) -> Result<ScanEngine> {
        let mut settings = self.config.scan.clone();
        if let Some(preset) = preset {
            settings.preset = preset.to_string();
        }

        let scorer_config =
            ScorerConfig::from_settings(&settings).context("Invalid scorer settings")?;
        let scan_config = ScanConfig::from_settings(&settings, scorer_config.min_score);
        let sets = SymbolSets::new(
            settings.large_caps.iter().cloned(),
            settings.speculative.iter().cloned(),
            settings.large_cap_threshold,
        );

        Ok(ScanEngine::new(
            self.router(),
            SignalScorer::new(scorer_config),
            Arc::new(self.load_predictor()),
            scan_config,
        )
        .with_symbol_sets(sets)
        .with_ranking(model::RankingConfig::from_settings(&settings)))
    }

    /// Scan `universe`, or the configured universe when empty.
    pub async fn scan(
        &self,
        universe: &[String],
        preset: Option<&str>,
        sentiment: Option<f64>,
    ) -> Result<RankedReport> {
        let universe = if universe.is_empty() {
            self.config.scan.universe.as_slice()
        } else {
            universe
        };
        let engine = self.scan_engine(preset)?;
        let sentiment = sentiment.unwrap_or(self.config.scan.sentiment);
        let result = engine.run_scan(universe, sentiment).await?;
        Ok(RankedReport::from(result))
    }

    /// Train the ensemble on provider history and store the artifact.
    pub async fn train(&self, symbols: &[String]) -> Result<TrainingReport> {
        let symbols = if symbols.is_empty() {
            self.config.scan.universe.clone()
        } else {
            symbols.to_vec()
        };
        anyhow::ensure!(!symbols.is_empty(), "No symbols to train on");

        let fetcher = BatchFetcher::new(
            self.router(),
            BatchConfig {
                max_concurrency: self.config.scan.max_concurrency,
                bars_limit: TRAINING_BARS,
                fetch_profiles: false,
            },
        );
        let series: Vec<_> = fetcher
            .fetch_all(&symbols)
            .await
            .into_iter()
            .filter_map(|outcome| match outcome {
                FetchOutcome::Data(data) => Some(data.series),
                FetchOutcome::NoData { symbol, reason } => {
                    warn!(symbol = %symbol, reason = %reason, "No training history");
                    None
                }
            })
            .collect();

        let index = match self.config.scan.index_symbol.as_deref() {
            Some(index) => self.router.get_daily_bars(index, TRAINING_BARS).await.ok(),
            None => None,
        };
        let context = data::MarketContext::new(0.0, self.config.scan.sentiment);
        let labels = LabelConfig::from_settings(&self.config.model);
        let set = build_training_set(&series, index.as_ref(), &context, &labels);

        let params =
            TrainingParams::from_settings(&self.config.model).context("Invalid model settings")?;
        let (model, report) = EnsembleModel::train(&set, &params).context("Training failed")?;

        let name = self.config.model.name.clone();
        let artifact = ModelArtifact::new(&name, model, Some(report.clone()));
        self.store
            .save(&name, &artifact)
            .context("Failed to save model")?;

        Ok(report)
    }

    /// Health-check every provider and return their status.
    pub async fn check_providers(&self) -> Vec<ProviderInfo> {
        self.router.run_health_checks().await
    }

    /// Model directory used by the file store.
    pub fn model_dir(&self) -> PathBuf {
        self.config.model.model_dir()
    }
}

/// Build the provider described by `settings`; `None` when an HTTP
/// provider has no API key.
fn build_provider(settings: &ProviderSettings) -> Result<Option<Arc<dyn DataProvider>>> {
    let priority = settings.priority.unwrap_or(1);
    let provider: Arc<dyn DataProvider> = match settings.kind {
        ProviderKind::TwelveData => {
            let Some(key) = settings.resolved_api_key() else {
                return Ok(None);
            };
            let mut p = TwelveDataProvider::new(key)
                .with_name(settings.name.clone())
                .with_priority(priority);
            if let Some(url) = &settings.base_url {
                p = p.with_base_url(url.clone());
            }
            Arc::new(p)
        }
        ProviderKind::AlphaVantage => {
            let Some(key) = settings.resolved_api_key() else {
                return Ok(None);
            };
            let mut p = AlphaVantageProvider::new(key)
                .with_name(settings.name.clone())
                .with_priority(priority);
            if let Some(url) = &settings.base_url {
                p = p.with_base_url(url.clone());
            }
            Arc::new(p)
        }
        ProviderKind::Snapshot => {
            let path = settings.snapshot_path.as_deref().with_context(|| {
                format!("Snapshot provider '{}' needs snapshot_path", settings.name)
            })?;
            Arc::new(InMemoryProvider::from_snapshot_file(
                settings.name.clone(),
                priority,
                std::path::Path::new(path),
            )?)
        }
    };
    Ok(Some(provider))
}

/// Parse a scorer preset name, for callers validating CLI input early.
pub fn parse_preset(name: &str) -> Result<ScorerPreset> {
    Ok(name.parse::<ScorerPreset>()?)
}
