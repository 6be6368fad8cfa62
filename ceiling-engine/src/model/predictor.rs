//! Predictor trait and the ensemble/heuristic fallback chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::ensemble::EnsembleModel;
use super::features::PredictionInput;
use super::heuristic::HeuristicPredictor;
use super::ModelError;

/// Produces a ceiling probability in [0, 1] for one symbol.
pub trait CeilingPredictor: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, input: &PredictionInput) -> Result<f64, ModelError>;

    /// Probability plus the signals that drove it. Defaults to no signals.
    fn predict_explained(
        &self,
        input: &PredictionInput,
    ) -> Result<(f64, Vec<String>), ModelError> {
        self.predict(input).map(|p| (p, Vec::new()))
    }
}

/// Trained ensemble behind the predictor trait.
#[derive(Debug, Clone)]
pub struct EnsemblePredictor {
    model: EnsembleModel,
}

impl EnsemblePredictor {
    pub fn new(model: EnsembleModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &EnsembleModel {
        &self.model
    }
}

impl CeilingPredictor for EnsemblePredictor {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn predict(&self, input: &PredictionInput) -> Result<f64, ModelError> {
        self.predict_explained(input).map(|(p, _)| p)
    }

    fn predict_explained(
        &self,
        input: &PredictionInput,
    ) -> Result<(f64, Vec<String>), ModelError> {
        if !input.features.is_finite() {
            return Err(ModelError::Inference(format!(
                "non-finite features for {}",
                input.symbol
            )));
        }
        let breakdown = self.model.predict_breakdown(input.features.as_slice())?;
        Ok((breakdown.probability, breakdown.signals()))
    }
}

// ============================================================================
// Fallback Chain
// ============================================================================

/// Which path produced a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Ensemble,
    Heuristic,
}

impl fmt::Display for PredictionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ensemble => write!(f, "ensemble"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub probability: f64,
    /// Rules or model inputs that drove the probability
    pub contributing_signals: Vec<String>,
    pub source: PredictionSource,
}

/// Uses the ensemble when one is loaded and falls back to the heuristic on
/// a missing model or an inference failure. Arity errors are propagated.
pub struct FallbackPredictor {
    ensemble: Option<Box<dyn CeilingPredictor>>,
    heuristic: HeuristicPredictor,
}

impl FallbackPredictor {
    pub fn new(ensemble: Option<EnsembleModel>) -> Self {
        Self {
            ensemble: ensemble
                .map(|m| Box::new(EnsemblePredictor::new(m)) as Box<dyn CeilingPredictor>),
            heuristic: HeuristicPredictor::new(),
        }
    }

    /// Heuristic only.
    pub fn heuristic_only() -> Self {
        Self::new(None)
    }

    /// Wrap any predictor as the primary path.
    pub fn with_primary(primary: Box<dyn CeilingPredictor>) -> Self {
        Self {
            ensemble: Some(primary),
            heuristic: HeuristicPredictor::new(),
        }
    }

    pub fn has_model(&self) -> bool {
        self.ensemble.is_some()
    }

    pub fn predict_with_source(
        &self,
        input: &PredictionInput,
    ) -> Result<PredictionResult, ModelError> {
        if let Some(primary) = &self.ensemble {
            match primary.predict_explained(input) {
                Ok((p, contributing_signals)) => {
                    return Ok(PredictionResult {
                        symbol: input.symbol.clone(),
                        probability: p.clamp(0.0, 1.0),
                        contributing_signals,
                        source: PredictionSource::Ensemble,
                    })
                }
                Err(e) if e.is_contract_violation() => return Err(e),
                Err(e) => {
                    warn!(
                        symbol = %input.symbol,
                        predictor = primary.name(),
                        error = %e,
                        "Model inference failed, using heuristic"
                    );
                }
            }
        } else {
            debug!(symbol = %input.symbol, "No trained model, using heuristic");
        }

        let (probability, contributing_signals) = self.heuristic.explain(input);
        Ok(PredictionResult {
            symbol: input.symbol.clone(),
            probability,
            contributing_signals,
            source: PredictionSource::Heuristic,
        })
    }
}

impl CeilingPredictor for FallbackPredictor {
    fn name(&self) -> &str {
        match &self.ensemble {
            Some(_) => "ensemble+heuristic",
            None => "heuristic",
        }
    }

    fn predict(&self, input: &PredictionInput) -> Result<f64, ModelError> {
        self.predict_with_source(input).map(|r| r.probability)
    }
}
