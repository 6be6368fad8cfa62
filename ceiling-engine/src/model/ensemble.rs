//! Weighted random forest + gradient boosting ensemble.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use ceiling_common::ModelSettings;

use super::boosting::{BoostingParams, GradientBoosting};
use super::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use super::forest::{ForestParams, RandomForest};
use super::scaler::StandardScaler;
use super::ModelError;

// ============================================================================
// Weights
// ============================================================================

/// Blend weights; each in [0, 1] and summing to 1 so the blend stays a
/// probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    forest: f64,
    boosting: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            forest: 0.6,
            boosting: 0.4,
        }
    }
}

impl EnsembleWeights {
    pub fn new(forest: f64, boosting: f64) -> Result<Self, ModelError> {
        let in_range = |w: f64| w.is_finite() && (0.0..=1.0).contains(&w);
        if !in_range(forest) || !in_range(boosting) {
            return Err(ModelError::InvalidWeights(format!(
                "weights must be in [0, 1], got {} / {}",
                forest, boosting
            )));
        }
        if (forest + boosting - 1.0).abs() > 1e-6 {
            return Err(ModelError::InvalidWeights(format!(
                "weights must sum to 1, got {}",
                forest + boosting
            )));
        }
        Ok(Self { forest, boosting })
    }

    pub fn forest(&self) -> f64 {
        self.forest
    }

    pub fn boosting(&self) -> f64 {
        self.boosting
    }

    pub fn blend(&self, forest_p: f64, boosting_p: f64) -> f64 {
        (self.forest * forest_p + self.boosting * boosting_p).clamp(0.0, 1.0)
    }
}

/// Inputs at least this many standard deviations from the training mean
/// are reported with a prediction.
const OUTLIER_SIGMA: f64 = 1.0;
const MAX_OUTLIERS: usize = 3;

/// Member probabilities behind one blended prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionBreakdown {
    pub forest: f64,
    pub boosting: f64,
    pub probability: f64,
    pub weights: EnsembleWeights,
    /// Scaled inputs furthest from zero, largest first
    pub outliers: Vec<(&'static str, f64)>,
}

impl PredictionBreakdown {
    pub fn signals(&self) -> Vec<String> {
        let mut signals = vec![
            format!("forest {:.2} (w {:.2})", self.forest, self.weights.forest()),
            format!("boosting {:.2} (w {:.2})", self.boosting, self.weights.boosting()),
        ];
        signals.extend(
            self.outliers
                .iter()
                .map(|(name, z)| format!("{} {:+.1} sd", name, z)),
        );
        signals
    }
}

// ============================================================================
// Training Data
// ============================================================================

/// Labelled feature rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSet {
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
}

impl TrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, features: FeatureVector, label: bool) {
        self.rows.push(features.as_slice().to_vec());
        self.labels.push(label);
    }

    pub fn extend(&mut self, other: TrainingSet) {
        self.rows.extend(other.rows);
        self.labels.extend(other.labels);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|l| **l).count()
    }
}

/// Training hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainingParams {
    pub min_samples: usize,
    pub n_trees: usize,
    pub forest_depth: usize,
    pub boosting_depth: usize,
    pub learning_rate: f64,
    pub holdout_fraction: f64,
    pub weights: EnsembleWeights,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            min_samples: 50,
            n_trees: 100,
            forest_depth: 10,
            boosting_depth: 6,
            learning_rate: 0.1,
            holdout_fraction: 0.2,
            weights: EnsembleWeights::default(),
            seed: 42,
        }
    }
}

impl TrainingParams {
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, ModelError> {
        Ok(Self {
            min_samples: settings.min_samples,
            n_trees: settings.n_trees,
            weights: EnsembleWeights::new(settings.forest_weight, settings.boosting_weight)?,
            seed: settings.seed,
            ..Default::default()
        })
    }
}

/// Holdout accuracy of each model after training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub positives: usize,
    pub train_samples: usize,
    pub holdout_samples: usize,
    pub forest_accuracy: f64,
    pub boosting_accuracy: f64,
    pub ensemble_accuracy: f64,
}

// ============================================================================
// Ensemble Model
// ============================================================================

/// Trained scaler, forest and boosting model with their blend weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleModel {
    scaler: StandardScaler,
    forest: RandomForest,
    boosting: GradientBoosting,
    weights: EnsembleWeights,
}

impl EnsembleModel {
    /// Train both models on an 80/20 seeded split and report holdout accuracy.
    pub fn train(
        set: &TrainingSet,
        params: &TrainingParams,
    ) -> Result<(Self, TrainingReport), ModelError> {
        if let Some(bad) = set.rows.iter().find(|r| r.len() != FEATURE_COUNT) {
            return Err(ModelError::FeatureArity {
                expected: FEATURE_COUNT,
                got: bad.len(),
            });
        }
        if set.len() < params.min_samples {
            return Err(ModelError::InsufficientSamples {
                got: set.len(),
                min: params.min_samples,
            });
        }
        let positives = set.positives();
        if positives == 0 || positives == set.len() {
            return Err(ModelError::SingleClass);
        }

        let mut order: Vec<usize> = (0..set.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(params.seed));
        let holdout_len = ((set.len() as f64 * params.holdout_fraction).round() as usize)
            .clamp(1, set.len() - 1);
        let (holdout_idx, train_idx) = order.split_at(holdout_len);

        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
            idx.iter()
                .map(|&i| (set.rows[i].clone(), if set.labels[i] { 1.0 } else { 0.0 }))
                .unzip()
        };
        let (train_rows, train_targets) = pick(train_idx);
        let (holdout_rows, holdout_targets) = pick(holdout_idx);

        let scaler = StandardScaler::fit(&train_rows)?;
        let train_scaled = scaler.transform_all(&train_rows)?;
        let holdout_scaled = scaler.transform_all(&holdout_rows)?;

        let forest = RandomForest::fit(
            &train_scaled,
            &train_targets,
            &ForestParams {
                n_trees: params.n_trees,
                max_depth: params.forest_depth,
                seed: params.seed,
            },
        );
        let boosting = GradientBoosting::fit(
            &train_scaled,
            &train_targets,
            &BoostingParams {
                n_trees: params.n_trees,
                max_depth: params.boosting_depth,
                learning_rate: params.learning_rate,
                seed: params.seed,
            },
        );

        let model = Self {
            scaler,
            forest,
            boosting,
            weights: params.weights,
        };

        let accuracy = |predict: &dyn Fn(&[f64]) -> f64| {
            let correct = holdout_scaled
                .iter()
                .zip(&holdout_targets)
                .filter(|(row, y)| (predict(row) >= 0.5) == (**y >= 0.5))
                .count();
            correct as f64 / holdout_scaled.len() as f64
        };
        let report = TrainingReport {
            samples: set.len(),
            positives,
            train_samples: train_rows.len(),
            holdout_samples: holdout_rows.len(),
            forest_accuracy: accuracy(&|r| model.forest.predict_proba(r)),
            boosting_accuracy: accuracy(&|r| model.boosting.predict_proba(r)),
            ensemble_accuracy: accuracy(&|r| {
                model
                    .weights
                    .blend(model.forest.predict_proba(r), model.boosting.predict_proba(r))
            }),
        };

        info!(
            samples = report.samples,
            positives = report.positives,
            forest_accuracy = format!("{:.3}", report.forest_accuracy),
            boosting_accuracy = format!("{:.3}", report.boosting_accuracy),
            ensemble_accuracy = format!("{:.3}", report.ensemble_accuracy),
            "Ensemble trained"
        );

        Ok((model, report))
    }

    /// Blended positive-class probability for one unscaled feature row.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
        self.predict_breakdown(row).map(|b| b.probability)
    }

    /// Member probabilities and the most unusual inputs behind one prediction.
    pub fn predict_breakdown(&self, row: &[f64]) -> Result<PredictionBreakdown, ModelError> {
        let scaled = self.scaler.transform(row)?;
        let forest = self.forest.predict_proba(&scaled);
        let boosting = self.boosting.predict_proba(&scaled);
        let probability = self.weights.blend(forest, boosting);
        if !probability.is_finite() {
            return Err(ModelError::Inference(format!(
                "non-finite probability {}",
                probability
            )));
        }

        let mut outliers: Vec<(&'static str, f64)> = scaled
            .iter()
            .zip(FEATURE_NAMES.iter())
            .filter(|(z, _)| z.abs() >= OUTLIER_SIGMA)
            .map(|(z, name)| (*name, *z))
            .collect();
        outliers.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        outliers.truncate(MAX_OUTLIERS);

        Ok(PredictionBreakdown {
            forest,
            boosting,
            probability,
            weights: self.weights,
            outliers,
        })
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    /// Feature names the model was trained on.
    pub fn feature_names() -> Vec<String> {
        FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }
}
