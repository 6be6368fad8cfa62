//! Gradient-boosted regression trees with logistic loss.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::tree::{Criterion, DecisionTree, TreeParams};

/// Clamp for the prior probability so the log-odds stay finite.
const PRIOR_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct BoostingParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 6,
            learning_rate: 0.1,
            seed: 42,
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Binary classifier: log-odds prior plus shrunken Newton-step trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree>,
}

impl GradientBoosting {
    /// Fit on rows with 0/1 targets.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], params: &BoostingParams) -> Self {
        let n = rows.len();
        let prior = if n == 0 {
            0.5
        } else {
            targets.iter().sum::<f64>() / n as f64
        }
        .clamp(PRIOR_EPS, 1.0 - PRIOR_EPS);
        let init = (prior / (1.0 - prior)).ln();

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            ..Default::default()
        };
        let indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut raw = vec![init; n];
        let mut trees = Vec::with_capacity(params.n_trees);

        for _ in 0..params.n_trees {
            let probs: Vec<f64> = raw.iter().map(|f| sigmoid(*f)).collect();
            let residuals: Vec<f64> = targets.iter().zip(&probs).map(|(y, p)| y - p).collect();

            // Newton step for the logistic loss
            let leaf = |idx: &[usize]| {
                let num: f64 = idx.iter().map(|&i| residuals[i]).sum();
                let den: f64 = idx.iter().map(|&i| probs[i] * (1.0 - probs[i])).sum();
                if den.abs() < 1e-12 {
                    0.0
                } else {
                    num / den
                }
            };

            let tree = DecisionTree::fit_with_leaf(
                rows,
                &residuals,
                &indices,
                tree_params,
                Criterion::SquaredError,
                &leaf,
                &mut rng,
            );

            for (i, row) in rows.iter().enumerate() {
                raw[i] += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Self {
            init,
            learning_rate: params.learning_rate,
            trees,
        }
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let raw = self.init
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict(row))
                .sum::<f64>();
        sigmoid(raw)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
