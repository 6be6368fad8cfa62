//! Training, persistence and service-level integration tests.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use ceiling_common::Config;
use ceiling_engine::data::{Bar, DataProviderRouter, InMemoryProvider, MarketContext, PriceSeries};
use ceiling_engine::indicators::IndicatorSet;
use ceiling_engine::model::{
    build_training_set, EnsembleModel, FallbackPredictor, InMemoryModelStore, JsonFileModelStore,
    LabelConfig, ModelArtifact, ModelStore, PredictionInput, PredictionSource, TrainingParams,
};
use ceiling_engine::CeilingService;

// ============================================================================
// Test Data Generators
// ============================================================================

/// Gently oscillating series with a 10% jump every `period` sessions.
fn jumpy_series(symbol: &str, days: usize, period: usize, phase: usize) -> PriceSeries {
    let start = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    let mut closes = Vec::with_capacity(days);
    let mut volumes = Vec::with_capacity(days);
    let mut close = 25.0;
    for i in 0..days {
        if i > 0 && (i + phase) % period == 0 {
            close *= 1.10;
            volumes.push(900_000.0);
        } else {
            close *= 1.0 + 0.004 * ((i % 5) as f64 - 2.0);
            // Volume builds up ahead of each jump
            volumes.push(200_000.0 + 80_000.0 * ((i + phase) % period) as f64);
        }
        closes.push(close);
    }

    let bars = closes
        .iter()
        .zip(&volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: start + Duration::days(i as i64),
                open,
                high: open.max(close) * 1.005,
                low: open.min(close) * 0.995,
                close,
                volume,
            }
        })
        .collect();
    PriceSeries::new(symbol, bars).unwrap()
}

fn market_series() -> Vec<PriceSeries> {
    vec![
        jumpy_series("EKIZ", 120, 12, 0),
        jumpy_series("ASELS", 120, 10, 3),
        jumpy_series("SASA", 120, 15, 7),
    ]
}

fn fast_params() -> TrainingParams {
    TrainingParams {
        n_trees: 20,
        ..TrainingParams::default()
    }
}

fn input_for(series: &PriceSeries) -> PredictionInput {
    let indicators = IndicatorSet::compute(series);
    PredictionInput::new(
        series.symbol(),
        &indicators,
        &MarketContext::default(),
        true,
        false,
    )
}

// ============================================================================
// Training and Persistence
// ============================================================================

#[test]
fn test_training_set_from_market_history() {
    let set = build_training_set(
        &market_series(),
        None,
        &MarketContext::default(),
        &LabelConfig::default(),
    );

    // 120 bars, 30 warm-up, last bar has no next session
    assert_eq!(set.len(), 3 * 90);
    assert!(set.positives() > 0);
    assert!(set.positives() < set.len());
}

#[test]
fn test_train_save_load_predict() {
    let set = build_training_set(
        &market_series(),
        None,
        &MarketContext::default(),
        &LabelConfig::default(),
    );
    let (model, report) = EnsembleModel::train(&set, &fast_params()).unwrap();
    assert_eq!(report.samples, set.len());
    assert_eq!(report.train_samples + report.holdout_samples, set.len());

    let dir = TempDir::new().unwrap();
    let store = JsonFileModelStore::new(dir.path());
    let artifact = ModelArtifact::new("ceiling_ensemble", model, Some(report));
    store.save("ceiling_ensemble", &artifact).unwrap();
    assert!(dir.path().join("ceiling_ensemble.json").exists());

    let loaded = store.load("ceiling_ensemble").unwrap();
    loaded.check_features().unwrap();

    let input = input_for(&jumpy_series("EKIZ", 60, 12, 0));
    let before = artifact.model.predict_proba(input.features.as_slice()).unwrap();
    let after = loaded.model.predict_proba(input.features.as_slice()).unwrap();
    assert!((before - after).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&after));
}

#[test]
fn test_missing_model_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileModelStore::new(dir.path());
    let err = store.load("absent").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_fallback_predictor_uses_trained_model() {
    let set = build_training_set(
        &market_series(),
        None,
        &MarketContext::default(),
        &LabelConfig::default(),
    );
    let (model, _) = EnsembleModel::train(&set, &fast_params()).unwrap();
    let predictor = FallbackPredictor::new(Some(model));
    assert!(predictor.has_model());

    let input = input_for(&jumpy_series("ASELS", 60, 10, 3));
    let result = predictor.predict_with_source(&input).unwrap();
    assert_eq!(result.source, PredictionSource::Ensemble);
    assert_eq!(result.symbol, "ASELS");
}

// ============================================================================
// Service
// ============================================================================

async fn service(store: Arc<dyn ModelStore>) -> CeilingService {
    let router = Arc::new(DataProviderRouter::new());
    let mut provider = InMemoryProvider::new("memory", 1);
    for series in market_series() {
        provider.insert_series(series);
    }
    router.register(Arc::new(provider)).await;

    let mut config = Config::default();
    config.scan.universe = vec!["EKIZ".into(), "ASELS".into(), "SASA".into()];
    config.model.n_trees = 20;
    CeilingService::with_parts(config, router, store)
}

#[tokio::test]
async fn test_service_without_model_uses_heuristic() {
    let service = service(Arc::new(InMemoryModelStore::new())).await;
    assert!(!service.load_predictor().has_model());

    let report = service.scan(&[], None, None).await.unwrap();
    assert_eq!(report.total_scanned, 3);
    assert!(report
        .entries
        .iter()
        .filter_map(|e| e.prediction.as_ref())
        .all(|p| p.source == PredictionSource::Heuristic));
}

#[tokio::test]
async fn test_service_train_then_scan_with_ensemble() {
    let store: Arc<dyn ModelStore> = Arc::new(InMemoryModelStore::new());
    let service = service(Arc::clone(&store)).await;

    let report = service.train(&[]).await.unwrap();
    assert_eq!(report.samples, 3 * 90);

    let artifact = store.load("ceiling_ensemble").unwrap();
    assert_eq!(artifact.report.as_ref().map(|r| r.samples), Some(270));
    assert!(service.load_predictor().has_model());

    let scan = service.scan(&[], None, Some(0.5)).await.unwrap();
    assert!(scan
        .entries
        .iter()
        .filter_map(|e| e.prediction.as_ref())
        .all(|p| p.source == PredictionSource::Ensemble));
}

#[tokio::test]
async fn test_service_rejects_unknown_preset() {
    let service = service(Arc::new(InMemoryModelStore::new())).await;
    assert!(service.scan(&[], Some("moonshot"), None).await.is_err());
}
