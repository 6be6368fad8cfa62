//! Fixed-order feature vector and prediction inputs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::ModelError;
use crate::data::{CompanyProfile, MarketContext};
use crate::indicators::{IndicatorSet, Patterns, VolumeAlert};

/// Number of model features.
pub const FEATURE_COUNT: usize = 16;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "rsi",
    "macd",
    "macd_signal",
    "price_change_1d",
    "price_change_5d",
    "volume_ratio_20",
    "volume_ratio_5",
    "volume_momentum",
    "technical_score",
    "ceiling_score",
    "momentum_score",
    "pattern_score",
    "sentiment",
    "index_change",
    "volatility",
    "momentum_continuation",
];

/// One model feature; the discriminant is its position in the vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Rsi,
    Macd,
    MacdSignal,
    PriceChange1d,
    PriceChange5d,
    VolumeRatio20,
    VolumeRatio5,
    VolumeMomentum,
    TechnicalScore,
    CeilingScore,
    MomentumScore,
    PatternScore,
    Sentiment,
    IndexChange,
    Volatility,
    MomentumContinuation,
}

impl Feature {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self.index()]
    }
}

/// Fixed-arity model input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Build from a slice; any length other than [`FEATURE_COUNT`] is rejected.
    pub fn from_slice(values: &[f64]) -> Result<Self, ModelError> {
        let array: [f64; FEATURE_COUNT] =
            values.try_into().map_err(|_| ModelError::FeatureArity {
                expected: FEATURE_COUNT,
                got: values.len(),
            })?;
        Ok(Self(array))
    }

    /// Assemble the features of one symbol from its indicators and the market.
    pub fn from_indicators(indicators: &IndicatorSet, market: &MarketContext) -> Self {
        Self([
            indicators.rsi_14.value(),
            indicators.macd.line.value(),
            indicators.macd.signal.value(),
            indicators.change_1d.value(),
            indicators.momentum_5d.value(),
            indicators.volume_ratio_20.value(),
            indicators.volume_ratio_5.value(),
            indicators.volume_momentum.value(),
            indicators.technical_score,
            indicators.ceiling_score,
            indicators.momentum_score,
            indicators.pattern_score(),
            market.sentiment,
            market.index_change_pct,
            indicators.volatility.value(),
            if indicators.patterns.momentum_continuation {
                1.0
            } else {
                0.0
            },
        ])
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

// ============================================================================
// Prediction Input
// ============================================================================

/// Inputs only the heuristic reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionHints {
    pub macd_histogram: f64,
    /// Bollinger position in percent of the band (0-100)
    pub bollinger_position: f64,
    pub volume_alerts: Vec<VolumeAlert>,
    pub patterns: Patterns,
    pub small_mid_cap: bool,
    pub speculative: bool,
}

impl PredictionHints {
    /// Bollinger position re-centred to [-1, 1].
    pub fn centred_bollinger(&self) -> f64 {
        (self.bollinger_position - 50.0) / 50.0
    }

    pub fn has_alert(&self, alert: VolumeAlert) -> bool {
        self.volume_alerts.contains(&alert)
    }
}

/// Everything a predictor needs for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub symbol: String,
    pub features: FeatureVector,
    pub hints: PredictionHints,
}

impl PredictionInput {
    pub fn new(
        symbol: impl Into<String>,
        indicators: &IndicatorSet,
        market: &MarketContext,
        small_mid_cap: bool,
        speculative: bool,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            features: FeatureVector::from_indicators(indicators, market),
            hints: PredictionHints {
                macd_histogram: indicators.macd.histogram.value(),
                bollinger_position: indicators.bollinger.position.value(),
                volume_alerts: indicators.volume_alerts.clone(),
                patterns: indicators.patterns,
                small_mid_cap,
                speculative,
            },
        }
    }
}

// ============================================================================
// Symbol Sets
// ============================================================================

/// Curated large-cap and speculative symbol sets.
#[derive(Debug, Clone, Default)]
pub struct SymbolSets {
    large_caps: HashSet<String>,
    speculative: HashSet<String>,
    large_cap_threshold: f64,
}

impl SymbolSets {
    pub fn new(
        large_caps: impl IntoIterator<Item = String>,
        speculative: impl IntoIterator<Item = String>,
        large_cap_threshold: f64,
    ) -> Self {
        Self {
            large_caps: large_caps.into_iter().map(|s| s.to_uppercase()).collect(),
            speculative: speculative.into_iter().map(|s| s.to_uppercase()).collect(),
            large_cap_threshold,
        }
    }

    /// A known market cap decides; otherwise anything outside the
    /// large-cap set counts as small or mid.
    pub fn is_small_mid_cap(&self, symbol: &str, profile: &CompanyProfile) -> bool {
        match profile.market_cap {
            Some(cap) if self.large_cap_threshold > 0.0 => cap < self.large_cap_threshold,
            _ => !self.large_caps.contains(&symbol.to_uppercase()),
        }
    }

    pub fn is_speculative(&self, symbol: &str) -> bool {
        self.speculative.contains(&symbol.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::series_from;

    #[test]
    fn test_feature_names_match_enum() {
        assert_eq!(Feature::Rsi.name(), "rsi");
        assert_eq!(Feature::PatternScore.index(), 11);
        assert_eq!(Feature::MomentumContinuation.name(), "momentum_continuation");
    }

    #[test]
    fn test_from_slice_arity() {
        assert!(FeatureVector::from_slice(&[0.0; FEATURE_COUNT]).is_ok());
        assert_eq!(
            FeatureVector::from_slice(&[0.0; 15]),
            Err(ModelError::FeatureArity {
                expected: 16,
                got: 15
            })
        );
    }

    #[test]
    fn test_from_indicators_order() {
        let closes: Vec<f64> = (0..40).map(|i| 10.0 + i as f64 * 0.1).collect();
        let volumes = vec![1000.0; 40];
        let indicators = IndicatorSet::compute(&series_from("ABC", &closes, &volumes));
        let market = MarketContext::new(-1.5, 0.8);

        let features = FeatureVector::from_indicators(&indicators, &market);
        assert_eq!(features.get(Feature::Rsi), indicators.rsi_14.value());
        assert_eq!(features.get(Feature::Sentiment), 0.8);
        assert_eq!(features.get(Feature::IndexChange), -1.5);
        assert_eq!(features.get(Feature::MomentumContinuation), 1.0);
        assert!(features.is_finite());
    }

    #[test]
    fn test_symbol_sets() {
        let sets = SymbolSets::new(vec!["THYAO".into()], vec!["ekiz".into()], 50e9);
        let unknown = CompanyProfile::unknown("THYAO");
        assert!(!sets.is_small_mid_cap("THYAO", &unknown));
        assert!(sets.is_small_mid_cap("ABCDE", &unknown));

        let mut known = CompanyProfile::unknown("THYAO");
        known.market_cap = Some(1e9);
        assert!(sets.is_small_mid_cap("THYAO", &known));

        assert!(sets.is_speculative("EKIZ"));
        assert!(!sets.is_speculative("THYAO"));
    }

    #[test]
    fn test_centred_bollinger() {
        let hints = PredictionHints {
            macd_histogram: 0.0,
            bollinger_position: 100.0,
            volume_alerts: vec![],
            patterns: Patterns {
                breakout: crate::indicators::Breakout::None,
                gap: crate::indicators::Gap::None,
                support_resistance: crate::indicators::SupportResistance::Neutral,
                momentum_continuation: false,
            },
            small_mid_cap: false,
            speculative: false,
        };
        assert_eq!(hints.centred_bollinger(), 1.0);
    }
}
