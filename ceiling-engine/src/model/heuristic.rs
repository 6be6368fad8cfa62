//! Rule-based ceiling probability.
//!
//! Used whenever no trained ensemble is available. Each rule block adds
//! or subtracts a fixed increment; the sum is shifted by a base offset and
//! clamped to [0, 1].

use super::features::{Feature, PredictionInput};
use super::predictor::CeilingPredictor;
use super::ModelError;
use crate::indicators::{Breakout, Gap, SupportResistance, VolumeAlert};

/// Offset added to the rule sum before clamping.
const BASE_OFFSET: f64 = 0.3;

/// Stateless rule-based predictor.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPredictor;

impl HeuristicPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Probability for one input; never fails.
    pub fn probability(&self, input: &PredictionInput) -> f64 {
        self.explain(input).0
    }

    /// Probability together with a label for every rule that moved it.
    pub fn explain(&self, input: &PredictionInput) -> (f64, Vec<String>) {
        let rules = evaluate(input);
        let score = rules.score + BASE_OFFSET;
        let p = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        (p, rules.fired)
    }
}

impl CeilingPredictor for HeuristicPredictor {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn predict(&self, input: &PredictionInput) -> Result<f64, ModelError> {
        Ok(self.probability(input))
    }

    fn predict_explained(
        &self,
        input: &PredictionInput,
    ) -> Result<(f64, Vec<String>), ModelError> {
        Ok(self.explain(input))
    }
}

// ============================================================================
// Rule Blocks
// ============================================================================

/// Running rule sum and the labels of the rules that fired.
#[derive(Default)]
struct Rules {
    score: f64,
    fired: Vec<String>,
}

impl Rules {
    fn add(&mut self, label: impl AsRef<str>, delta: f64) {
        if delta == 0.0 {
            return;
        }
        self.score += delta;
        self.fired.push(format!("{} ({:+.2})", label.as_ref(), delta));
    }

    /// First matching band wins; no match adds nothing.
    fn band(&mut self, bands: &[(bool, &str, f64)]) {
        if let Some((_, label, delta)) = bands.iter().find(|(hit, _, _)| *hit) {
            self.add(*label, *delta);
        }
    }
}

fn evaluate(input: &PredictionInput) -> Rules {
    let f = &input.features;
    let hints = &input.hints;
    let change_1d = f.get(Feature::PriceChange1d);
    let sentiment = f.get(Feature::Sentiment);

    let mut rules = Rules::default();

    rules.band(&[
        (change_1d >= 8.0, "change_1d >= 8%", 0.6),
        (change_1d >= 5.0, "change_1d >= 5%", 0.4),
        (change_1d >= 2.0, "change_1d >= 2%", 0.2),
        (change_1d < -2.0, "change_1d < -2%", -0.4),
    ]);

    if hints.small_mid_cap {
        rules.add("small/mid cap", 0.3);
    }
    if hints.speculative {
        rules.add("speculative", 0.25);
    }

    let rsi = f.get(Feature::Rsi);
    rules.band(&[
        ((60.0..=75.0).contains(&rsi), "rsi 60-75", 0.25),
        ((50.0..=60.0).contains(&rsi), "rsi 50-60", 0.15),
        (
            (25.0..=35.0).contains(&rsi) && change_1d > 0.0,
            "rsi 25-35 bounce",
            0.1,
        ),
        (rsi > 80.0, "rsi > 80", -0.1),
    ]);

    let macd = f.get(Feature::Macd);
    let macd_signal = f.get(Feature::MacdSignal);
    rules.band(&[
        (
            macd > macd_signal && hints.macd_histogram > 0.0,
            "macd above signal",
            0.15,
        ),
        (macd < macd_signal, "macd below signal", -0.15),
    ]);

    let vol20 = f.get(Feature::VolumeRatio20);
    rules.band(&[
        (vol20 > 3.0, "vol20 > 3.0", 0.4),
        (vol20 > 2.5, "vol20 > 2.5", 0.35),
        (vol20 > 2.0, "vol20 > 2.0", 0.25),
        (vol20 > 1.5, "vol20 > 1.5", 0.15),
        (vol20 > 1.2, "vol20 > 1.2", 0.1),
        (vol20 < 0.7, "vol20 < 0.7", -0.25),
    ]);

    if hints.has_alert(VolumeAlert::ExplosiveVolume) {
        rules.add("explosive volume", 0.3);
    }
    if hints.has_alert(VolumeAlert::VolumeSpike) {
        rules.add("volume spike", 0.2);
    }
    if hints.has_alert(VolumeAlert::MomentumAcceleration) {
        rules.add("momentum acceleration", 0.15);
    }

    let volume_momentum = f.get(Feature::VolumeMomentum);
    rules.band(&[
        (volume_momentum > 1.8, "volume momentum > 1.8", 0.2),
        (volume_momentum > 1.5, "volume momentum > 1.5", 0.1),
    ]);

    let technical = f.get(Feature::TechnicalScore);
    rules.band(&[
        (technical > 70.0, "technical > 70", 0.1),
        (technical < 40.0, "technical < 40", -0.2),
    ]);

    sentiment_rule(&mut rules, sentiment, 0.1);

    let bollinger = hints.centred_bollinger();
    rules.band(&[
        (bollinger > 0.5, "upper bollinger half", 0.15),
        (bollinger > 0.0, "above bollinger middle", 0.1),
    ]);

    // Sentiment is counted twice, with a larger bonus the second time
    sentiment_rule(&mut rules, sentiment, 0.15);

    let change_5d = f.get(Feature::PriceChange5d);
    rules.band(&[
        (change_5d > 15.0, "change_5d > 15%", 0.2),
        (change_5d > 8.0, "change_5d > 8%", 0.1),
        (change_5d < -10.0, "change_5d < -10%", -0.2),
    ]);

    if hints.patterns.breakout == Breakout::Upward {
        rules.add("upward breakout", 0.25);
    }
    if hints.patterns.gap == Gap::Up {
        rules.add("gap up", 0.15);
    }
    if hints.patterns.support_resistance == SupportResistance::ResistanceBreak {
        rules.add("resistance break", 0.2);
    }
    if hints.patterns.momentum_continuation {
        rules.add("momentum continuation", 0.3);
    }

    let ceiling = f.get(Feature::CeilingScore);
    rules.band(&[
        (ceiling > 80.0, "ceiling score > 80", 0.25),
        (ceiling > 60.0, "ceiling score > 60", 0.15),
        (ceiling > 40.0, "ceiling score > 40", 0.1),
    ]);

    rules
}

fn sentiment_rule(rules: &mut Rules, sentiment: f64, bonus: f64) {
    rules.band(&[
        (sentiment > 0.7, "bullish market", bonus),
        (sentiment < 0.3, "bearish market", -0.1),
    ]);
}
