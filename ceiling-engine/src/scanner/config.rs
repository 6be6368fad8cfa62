//! Scan engine configuration.

use ceiling_common::{ScanMode, ScanSettings};

use crate::data::BatchConfig;

/// Thresholds and limits for one scan run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Minimum weighted score for an entry
    pub min_score: f64,
    /// Minimum ceiling probability for an entry, inclusive. The standalone
    /// ranking helper treats the same setting as a strict bound.
    pub min_probability: f64,
    /// Symbols fetched concurrently
    pub max_concurrency: usize,
    /// Daily bars requested per symbol
    pub bars_limit: usize,
    /// Maximum entries in the report
    pub report_limit: usize,
    pub mode: ScanMode,
    /// Symbols with fewer bars are skipped
    pub min_bars: usize,
    /// Broad index used for the market context
    pub index_symbol: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_score: 2.0,
            min_probability: 0.5,
            max_concurrency: 4,
            bars_limit: 60,
            report_limit: 20,
            mode: ScanMode::Combined,
            min_bars: 20,
            index_symbol: None,
        }
    }
}

impl ScanConfig {
    /// Build from settings; `preset_min_score` applies when the settings
    /// leave `min_score` unset.
    pub fn from_settings(settings: &ScanSettings, preset_min_score: f64) -> Self {
        Self {
            min_score: settings.min_score.unwrap_or(preset_min_score),
            min_probability: settings.min_probability,
            max_concurrency: settings.max_concurrency.max(1),
            bars_limit: settings.bars_limit,
            report_limit: settings.report_limit,
            mode: settings.mode,
            index_symbol: settings.index_symbol.clone(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_report_limit(mut self, limit: usize) -> Self {
        self.report_limit = limit;
        self
    }

    pub fn with_min_bars(mut self, min_bars: usize) -> Self {
        self.min_bars = min_bars;
        self
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_concurrency: self.max_concurrency,
            bars_limit: self.bars_limit,
            fetch_profiles: true,
        }
    }

    /// Whether a score/probability pair is admitted under the current mode.
    pub fn admits(&self, score: f64, probability: Option<f64>) -> bool {
        let score_ok = score >= self.min_score;
        let probability_ok = probability.is_some_and(|p| p >= self.min_probability);
        match self.mode {
            ScanMode::Score => score_ok,
            ScanMode::Predict => probability_ok,
            ScanMode::Combined => score_ok || probability_ok,
        }
    }
}
