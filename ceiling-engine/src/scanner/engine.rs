//! Scan engine: the per-symbol pipeline over a whole universe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use ceiling_common::logging::generate_trace_id;
use ceiling_common::ScanMode;

use crate::data::{BatchFetcher, DataProviderRouter, FetchOutcome, MarketContext, SymbolData};
use crate::indicators::IndicatorSet;
use crate::model::{
    FallbackPredictor, ModelError, PredictionInput, PredictionResult, RankingConfig, SymbolSets,
};
use crate::scorer::{ScoreBreakdown, ScorerInput, SignalScorer};

use super::config::ScanConfig;

// ============================================================================
// Errors and Results
// ============================================================================

#[derive(Debug, Error)]
pub enum ScanError {
    /// Every symbol in a non-empty universe came back without data
    #[error("All providers failed: no data for any of {requested} symbols")]
    AllProvidersFailed { requested: usize },

    /// Prediction contract violation
    #[error("Prediction failed: {0}")]
    Model(#[from] ModelError),
}

/// A symbol left out of the scan and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

/// One admitted symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEntry {
    pub breakdown: ScoreBreakdown,
    /// Absent in score-only mode
    pub prediction: Option<PredictionResult>,
}

impl ScanEntry {
    pub fn symbol(&self) -> &str {
        &self.breakdown.symbol
    }

    pub fn score(&self) -> f64 {
        self.breakdown.total_score
    }

    pub fn probability(&self) -> Option<f64> {
        self.prediction.as_ref().map(|p| p.probability)
    }
}

/// Outcome of one scan run, entries sorted best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: String,
    pub trace_id: String,
    pub mode: ScanMode,
    pub market: MarketContext,
    pub entries: Vec<ScanEntry>,
    pub skipped: Vec<SkippedSymbol>,
    /// Unique symbols requested
    pub total_scanned: usize,
    /// Symbols evaluated before threshold filtering
    pub evaluated: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScanResult {
    pub fn top(&self, n: usize) -> Vec<&ScanEntry> {
        self.entries.iter().take(n).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "Scanned {} symbols in {:.1}s: {} evaluated, {} skipped, {} admitted",
            self.total_scanned,
            self.duration_secs,
            self.evaluated,
            self.skipped.len(),
            self.entries.len()
        )
    }
}

// ============================================================================
// Scan Engine
// ============================================================================

/// Runs indicators, scorer and predictor over every symbol of a universe.
///
/// Each symbol is evaluated independently from its own fetched data and
/// the shared market context; a failing symbol is recorded as skipped and
/// never aborts the run.
pub struct ScanEngine {
    router: Arc<DataProviderRouter>,
    scorer: SignalScorer,
    predictor: Arc<FallbackPredictor>,
    config: ScanConfig,
    symbol_sets: SymbolSets,
    ranking: RankingConfig,
}

impl ScanEngine {
    pub fn new(
        router: Arc<DataProviderRouter>,
        scorer: SignalScorer,
        predictor: Arc<FallbackPredictor>,
        config: ScanConfig,
    ) -> Self {
        Self {
            router,
            scorer,
            predictor,
            config,
            symbol_sets: SymbolSets::default(),
            ranking: RankingConfig::default(),
        }
    }

    pub fn with_symbol_sets(mut self, sets: SymbolSets) -> Self {
        self.symbol_sets = sets;
        self
    }

    pub fn with_ranking(mut self, ranking: RankingConfig) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan a universe. Duplicate symbols are scanned once, first-seen
    /// order preserved.
    pub async fn run_scan(
        &self,
        universe: &[String],
        sentiment: f64,
    ) -> Result<ScanResult, ScanError> {
        let trace_id = generate_trace_id();
        let span = info_span!("scan", trace_id = %trace_id, mode = ?self.config.mode);
        self.run_scan_inner(universe, sentiment, trace_id)
            .instrument(span)
            .await
    }

    async fn run_scan_inner(
        &self,
        universe: &[String],
        sentiment: f64,
        trace_id: String,
    ) -> Result<ScanResult, ScanError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let id = format!("scan_{}", started_at.format("%Y%m%d_%H%M%S"));

        let symbols = dedup_symbols(universe);
        info!(symbols = symbols.len(), "Starting scan");

        let market = self
            .router
            .get_market_context(self.config.index_symbol.as_deref(), sentiment)
            .await;

        let fetcher = BatchFetcher::new(Arc::clone(&self.router), self.config.batch_config());
        let outcomes = fetcher.fetch_all(&symbols).await;

        let with_data = outcomes.iter().filter(|o| o.is_data()).count();
        if !symbols.is_empty() && with_data == 0 {
            warn!(requested = symbols.len(), "No provider returned data for any symbol");
            return Err(ScanError::AllProvidersFailed {
                requested: symbols.len(),
            });
        }

        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        let mut evaluated = 0;

        for outcome in outcomes {
            match outcome {
                FetchOutcome::NoData { symbol, reason } => {
                    skipped.push(SkippedSymbol { symbol, reason });
                }
                FetchOutcome::Data(data) => match self.evaluate(&data, &market)? {
                    Evaluation::Skipped(skip) => skipped.push(skip),
                    Evaluation::Scored(entry) => {
                        evaluated += 1;
                        if self.config.admits(entry.score(), entry.probability()) {
                            entries.push(entry);
                        } else {
                            debug!(
                                symbol = entry.symbol(),
                                score = entry.score(),
                                "Below thresholds"
                            );
                        }
                    }
                },
            }
        }

        sort_entries(&mut entries, self.config.mode);
        entries.truncate(self.config.report_limit);

        let completed_at = Utc::now();
        let result = ScanResult {
            id,
            trace_id,
            mode: self.config.mode,
            market,
            entries,
            skipped,
            total_scanned: symbols.len(),
            evaluated,
            started_at,
            completed_at,
            duration_secs: clock.elapsed().as_secs_f64(),
        };
        info!(
            admitted = result.entries.len(),
            skipped = result.skipped.len(),
            "{}",
            result.summary()
        );
        Ok(result)
    }

    /// Indicators, score and prediction for one symbol.
    fn evaluate(
        &self,
        data: &SymbolData,
        market: &MarketContext,
    ) -> Result<Evaluation, ScanError> {
        let symbol = data.series.symbol();
        if data.series.len() < self.config.min_bars {
            debug!(symbol = %symbol, bars = data.series.len(), "History too short");
            return Ok(Evaluation::Skipped(SkippedSymbol {
                symbol: symbol.to_string(),
                reason: format!(
                    "insufficient history: {} bars (minimum {})",
                    data.series.len(),
                    self.config.min_bars
                ),
            }));
        }

        let indicators = IndicatorSet::compute(&data.series);
        let volumes = data.series.volumes();
        let closes = data.series.closes();
        let highs = data.series.highs();
        let breakdown = self.scorer.score(&ScorerInput {
            symbol,
            indicators: &indicators,
            volumes: &volumes,
            closes: &closes,
            highs: &highs,
            profile: &data.profile,
        });

        let prediction = match self.config.mode {
            ScanMode::Score => None,
            ScanMode::Predict | ScanMode::Combined => {
                let input = PredictionInput::new(
                    symbol,
                    &indicators,
                    market,
                    self.symbol_sets.is_small_mid_cap(symbol, &data.profile),
                    self.symbol_sets.is_speculative(symbol),
                );
                let mut result = self.predictor.predict_with_source(&input)?;
                result.probability = self
                    .ranking
                    .adjust(&input, result.probability)
                    .unwrap_or(0.0);
                Some(result)
            }
        };

        Ok(Evaluation::Scored(ScanEntry {
            breakdown,
            prediction,
        }))
    }
}

enum Evaluation {
    Scored(ScanEntry),
    Skipped(SkippedSymbol),
}

fn dedup_symbols(universe: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    universe
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Best first; predict mode ranks by probability, the others by score.
/// Symbol order breaks ties so the output is deterministic.
fn sort_entries(entries: &mut [ScanEntry], mode: ScanMode) {
    let cmp_f64 = |a: f64, b: f64| b.partial_cmp(&a).unwrap_or(Ordering::Equal);
    let probability = |e: &ScanEntry| e.probability().unwrap_or(0.0);

    entries.sort_by(|a, b| {
        let primary = match mode {
            ScanMode::Predict => cmp_f64(probability(a), probability(b))
                .then_with(|| cmp_f64(a.score(), b.score())),
            ScanMode::Score | ScanMode::Combined => cmp_f64(a.score(), b.score())
                .then_with(|| cmp_f64(probability(a), probability(b))),
        };
        primary.then_with(|| a.symbol().cmp(b.symbol()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let universe: Vec<String> = ["thyao", "ASELS", "THYAO", " ", "EKIZ", "asels"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(dedup_symbols(&universe), vec!["THYAO", "ASELS", "EKIZ"]);
    }
}
