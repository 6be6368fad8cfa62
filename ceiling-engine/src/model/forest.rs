//! Bagged random forest classifier.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{Criterion, DecisionTree, TreeParams};

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            seed: 42,
        }
    }
}

/// Bootstrap-sampled Gini trees with √d features per split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on rows with 0/1 targets.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], params: &ForestParams) -> Self {
        let n = rows.len();
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            max_features: Some(max_features),
            ..Default::default()
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(rows, targets, &sample, tree_params, Criterion::Gini, &mut rng)
            })
            .collect();

        Self { trees }
    }

    /// Mean positive-class fraction over all trees.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
