//! Training-set construction from daily history.
//!
//! Every bar `t` past the warm-up contributes one row: features computed on
//! the prefix ending at `t`, labelled by whether bar `t + 1` closed at least
//! `ceiling_threshold` percent higher. The label bar is never part of the
//! prefix, so no future data reaches the features.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use ceiling_common::ModelSettings;

use super::ensemble::TrainingSet;
use super::features::FeatureVector;
use crate::data::{MarketContext, PriceSeries};
use crate::indicators::IndicatorSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelConfig {
    /// Next-bar gain (%) that counts as a ceiling event
    pub ceiling_threshold: f64,
    /// Bars required before the first row
    pub warmup_bars: usize,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            ceiling_threshold: 9.0,
            warmup_bars: 30,
        }
    }
}

impl LabelConfig {
    pub fn from_settings(settings: &ModelSettings) -> Self {
        Self {
            ceiling_threshold: settings.ceiling_threshold,
            warmup_bars: settings.warmup_bars.max(1),
        }
    }
}

/// Build labelled rows for every symbol.
///
/// With an `index` series the market feature uses the index change of the
/// same session; sessions missing from it, or no index at all, fall back to
/// `context`.
pub fn build_training_set(
    series: &[PriceSeries],
    index: Option<&PriceSeries>,
    context: &MarketContext,
    config: &LabelConfig,
) -> TrainingSet {
    let index_changes = index.map(daily_changes).unwrap_or_default();
    let mut set = TrainingSet::new();
    // At least one bar of features and one label bar
    let warmup = config.warmup_bars.max(1);

    for s in series {
        let bars = s.bars();
        if bars.len() < warmup + 1 {
            debug!(symbol = s.symbol(), bars = bars.len(), "Too short for training");
            continue;
        }

        let before = set.len();
        for t in (warmup - 1)..(bars.len() - 1) {
            let prefix = s.truncate_to(t);
            let indicators = IndicatorSet::compute(&prefix);

            let session = bars[t].timestamp.date_naive();
            let market = MarketContext::new(
                index_changes
                    .get(&session)
                    .copied()
                    .unwrap_or(context.index_change_pct),
                context.sentiment,
            );

            let features = FeatureVector::from_indicators(&indicators, &market);
            if !features.is_finite() {
                continue;
            }

            let next_change = bars[t + 1].change_pct_from(bars[t].close);
            set.push(features, next_change >= config.ceiling_threshold);
        }

        debug!(symbol = s.symbol(), rows = set.len() - before, "Training rows built");
    }

    info!(
        symbols = series.len(),
        rows = set.len(),
        positives = set.positives(),
        "Training set built"
    );
    set
}

fn daily_changes(index: &PriceSeries) -> HashMap<NaiveDate, f64> {
    index
        .bars()
        .windows(2)
        .map(|w| (w[1].timestamp.date_naive(), w[1].change_pct_from(w[0].close)))
        .collect()
}
