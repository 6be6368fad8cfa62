//! Ceiling-event prediction model.
//!
//! Two paths produce a probability in [0, 1] for one symbol:
//!
//! - **Trained**: a standard-scaled random forest and gradient-boosting
//!   ensemble, trained from history with [`EnsembleModel::train`] and
//!   persisted through a [`ModelStore`].
//! - **Fallback**: the rule-based [`HeuristicPredictor`], used whenever no
//!   trained model is available or inference fails.
//!
//! [`FallbackPredictor`] chooses between them and reports which path
//! produced each probability.

pub mod boosting;
pub mod ensemble;
pub mod features;
pub mod forest;
pub mod heuristic;
pub mod predictor;
pub mod ranking;
pub mod scaler;
pub mod store;
pub mod training;
pub mod tree;

use thiserror::Error;

pub use ensemble::{
    EnsembleModel, EnsembleWeights, PredictionBreakdown, TrainingParams, TrainingReport,
    TrainingSet,
};
pub use features::{
    Feature, FeatureVector, PredictionHints, PredictionInput, SymbolSets, FEATURE_COUNT,
    FEATURE_NAMES,
};
pub use heuristic::HeuristicPredictor;
pub use predictor::{
    CeilingPredictor, EnsemblePredictor, FallbackPredictor, PredictionResult, PredictionSource,
};
pub use ranking::{rank_candidates, RankedCandidate, RankingConfig};
pub use store::{InMemoryModelStore, JsonFileModelStore, ModelArtifact, ModelStore};
pub use training::{build_training_set, LabelConfig};

/// Model training and inference errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Feature vector length differs from the model's; a caller bug
    #[error("Feature arity mismatch: expected {expected}, got {got}")]
    FeatureArity { expected: usize, got: usize },

    #[error("Insufficient training samples: {got} (minimum {min})")]
    InsufficientSamples { got: usize, min: usize },

    #[error("Training labels contain a single class")]
    SingleClass,

    #[error("Invalid ensemble weights: {0}")]
    InvalidWeights(String),

    #[error("Model not trained")]
    NotTrained,

    #[error("Inference failed: {0}")]
    Inference(String),
}

impl ModelError {
    /// Contract violations that must never be masked by the fallback.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::FeatureArity { .. })
    }
}
