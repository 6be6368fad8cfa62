//! Probability ranking with market-wide penalty and drop exclusions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, warn};

use ceiling_common::ScanSettings;

use super::features::{Feature, PredictionInput};
use super::predictor::CeilingPredictor;
use super::ModelError;

#[derive(Debug, Clone, PartialEq)]
pub struct RankingConfig {
    /// Subtracted from every probability on a weak market day
    pub market_penalty: f64,
    /// Index change (%) below which the penalty applies
    pub market_drop_threshold: f64,
    pub max_drop_1d: f64,
    pub max_drop_5d: f64,
    /// Candidates must score strictly above this. Scan admission
    /// ([`crate::scanner::ScanConfig::admits`]) accepts a probability equal to it.
    pub min_probability: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            market_penalty: 0.2,
            market_drop_threshold: -1.0,
            max_drop_1d: -3.0,
            max_drop_5d: -8.0,
            min_probability: 0.5,
        }
    }
}

impl RankingConfig {
    pub fn from_settings(settings: &ScanSettings) -> Self {
        Self {
            market_penalty: settings.market_penalty,
            market_drop_threshold: settings.market_drop_threshold,
            max_drop_1d: settings.max_drop_1d,
            max_drop_5d: settings.max_drop_5d,
            min_probability: settings.min_probability,
        }
    }

    /// Whether the symbol is in a clear downtrend.
    pub fn is_excluded(&self, input: &PredictionInput) -> bool {
        input.features.get(Feature::PriceChange1d) < self.max_drop_1d
            || input.features.get(Feature::PriceChange5d) < self.max_drop_5d
    }

    /// Penalised probability, or `None` for an excluded symbol.
    pub fn adjust(&self, input: &PredictionInput, raw: f64) -> Option<f64> {
        if self.is_excluded(input) {
            return None;
        }
        let penalty = if input.features.get(Feature::IndexChange) < self.market_drop_threshold {
            self.market_penalty
        } else {
            0.0
        };
        Some((raw - penalty).max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub symbol: String,
    /// Probability after the market penalty
    pub probability: f64,
    pub raw_probability: f64,
    pub price_change_1d: f64,
    pub price_change_5d: f64,
}

/// Rank inputs by penalised probability, highest first.
///
/// Symbols that dropped too far are excluded before prediction. A
/// predictor error other than a feature arity mismatch skips the symbol.
pub fn rank_candidates(
    inputs: &[PredictionInput],
    predictor: &dyn CeilingPredictor,
    config: &RankingConfig,
) -> Result<Vec<RankedCandidate>, ModelError> {
    let mut ranked = Vec::new();

    for input in inputs {
        let change_1d = input.features.get(Feature::PriceChange1d);
        let change_5d = input.features.get(Feature::PriceChange5d);
        if config.is_excluded(input) {
            debug!(
                symbol = %input.symbol,
                change_1d = change_1d,
                change_5d = change_5d,
                "Excluded after drop"
            );
            continue;
        }

        let raw = match predictor.predict(input) {
            Ok(p) => p,
            Err(e) if e.is_contract_violation() => return Err(e),
            Err(e) => {
                warn!(symbol = %input.symbol, error = %e, "Prediction failed, skipping");
                continue;
            }
        };
        let Some(probability) = config.adjust(input, raw) else {
            continue;
        };

        if probability > config.min_probability {
            ranked.push(RankedCandidate {
                symbol: input.symbol.clone(),
                probability,
                raw_probability: raw,
                price_change_1d: change_1d,
                price_change_5d: change_5d,
            });
        }
    }

    ranked.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    // Sorted first, so the retained duplicate is the highest one
    let mut seen = HashSet::new();
    ranked.retain(|c| seen.insert(c.symbol.clone()));

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{Breakout, Gap, Patterns, SupportResistance};
    use crate::model::features::{FeatureVector, PredictionHints, FEATURE_COUNT};

    /// Echoes the 5-day volume ratio feature as the probability.
    struct EchoPredictor;

    impl CeilingPredictor for EchoPredictor {
        fn name(&self) -> &str {
            "echo"
        }

        fn predict(&self, input: &PredictionInput) -> Result<f64, ModelError> {
            match input.symbol.as_str() {
                "FAIL" => Err(ModelError::Inference("no".into())),
                "BAD" => Err(ModelError::FeatureArity {
                    expected: 16,
                    got: 3,
                }),
                _ => Ok(input.features.get(Feature::VolumeRatio5)),
            }
        }
    }

    fn input(symbol: &str, probability: f64, change_1d: f64, change_5d: f64, index: f64) -> PredictionInput {
        let mut values = [0.0; FEATURE_COUNT];
        values[Feature::VolumeRatio5.index()] = probability;
        values[Feature::PriceChange1d.index()] = change_1d;
        values[Feature::PriceChange5d.index()] = change_5d;
        values[Feature::IndexChange.index()] = index;
        PredictionInput {
            symbol: symbol.to_string(),
            features: FeatureVector::from_slice(&values).unwrap(),
            hints: PredictionHints {
                macd_histogram: 0.0,
                bollinger_position: 50.0,
                volume_alerts: vec![],
                patterns: Patterns {
                    breakout: Breakout::None,
                    gap: Gap::None,
                    support_resistance: SupportResistance::Neutral,
                    momentum_continuation: false,
                },
                small_mid_cap: false,
                speculative: false,
            },
        }
    }

    #[test]
    fn test_sorted_and_thresholded() {
        let inputs = vec![
            input("B", 0.7, 1.0, 2.0, 0.0),
            input("A", 0.9, 1.0, 2.0, 0.0),
            input("C", 0.5, 1.0, 2.0, 0.0),
            input("D", 0.7, 1.0, 2.0, 0.0),
        ];
        let ranked = rank_candidates(&inputs, &EchoPredictor, &RankingConfig::default()).unwrap();
        let symbols: Vec<&str> = ranked.iter().map(|c| c.symbol.as_str()).collect();
        // 0.5 is not strictly above the threshold
        assert_eq!(symbols, vec!["A", "B", "D"]);
    }

    #[test]
    fn test_drop_exclusions() {
        let inputs = vec![
            input("DROP1D", 0.9, -3.5, 0.0, 0.0),
            input("DROP5D", 0.9, 0.0, -9.0, 0.0),
            input("OK", 0.9, -2.9, -7.9, 0.0),
        ];
        let ranked = rank_candidates(&inputs, &EchoPredictor, &RankingConfig::default()).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "OK");
    }

    #[test]
    fn test_market_penalty() {
        let inputs = vec![input("A", 0.8, 0.0, 0.0, -1.5), input("B", 0.65, 0.0, 0.0, -1.5)];
        let ranked = rank_candidates(&inputs, &EchoPredictor, &RankingConfig::default()).unwrap();
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].probability - 0.6).abs() < 1e-9);
        assert!((ranked[0].raw_probability - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_duplicates_keep_highest() {
        let inputs = vec![input("A", 0.6, 0.0, 0.0, 0.0), input("A", 0.9, 0.0, 0.0, 0.0)];
        let ranked = rank_candidates(&inputs, &EchoPredictor, &RankingConfig::default()).unwrap();
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].probability - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_errors() {
        let inputs = vec![input("FAIL", 0.9, 0.0, 0.0, 0.0), input("A", 0.9, 0.0, 0.0, 0.0)];
        let ranked = rank_candidates(&inputs, &EchoPredictor, &RankingConfig::default()).unwrap();
        assert_eq!(ranked.len(), 1);

        let inputs = vec![input("BAD", 0.9, 0.0, 0.0, 0.0)];
        assert!(rank_candidates(&inputs, &EchoPredictor, &RankingConfig::default()).is_err());
    }
}
