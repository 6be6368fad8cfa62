//! CART decision trees.
//!
//! One implementation serves both ensemble members: classification trees
//! (Gini impurity on 0/1 targets, leaf = fraction of positives) for the
//! random forest and regression trees (squared error, custom leaf values)
//! for gradient boosting.
//!
//! Both impurities can be computed from running `(count, sum, sum_sq)`
//! totals, so a split search is one sorted sweep per candidate feature.

use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Split quality measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity; targets must be 0 or 1
    Gini,
    /// Sum of squared errors
    SquaredError,
}

impl Criterion {
    /// Impurity of a node, weighted by its size.
    fn impurity(self, count: f64, sum: f64, sum_sq: f64) -> f64 {
        if count <= 0.0 {
            return 0.0;
        }
        match self {
            Self::Gini => 2.0 * sum * (count - sum) / count,
            Self::SquaredError => (sum_sq - sum * sum / count).max(0.0),
        }
    }
}

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// A fitted binary tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct Builder<'a> {
    rows: &'a [Vec<f64>],
    targets: &'a [f64],
    params: TreeParams,
    criterion: Criterion,
    leaf_value: &'a dyn Fn(&[usize]) -> f64,
    n_features: usize,
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Fit on the sampled `indices`; leaves hold the mean target.
    pub fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: TreeParams,
        criterion: Criterion,
        rng: &mut StdRng,
    ) -> Self {
        let mean = |idx: &[usize]| {
            if idx.is_empty() {
                0.0
            } else {
                idx.iter().map(|&i| targets[i]).sum::<f64>() / idx.len() as f64
            }
        };
        Self::fit_with_leaf(rows, targets, indices, params, criterion, &mean, rng)
    }

    /// Fit with a caller-supplied leaf value function.
    pub fn fit_with_leaf(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: TreeParams,
        criterion: Criterion,
        leaf_value: &dyn Fn(&[usize]) -> f64,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut builder = Builder {
            rows,
            targets,
            params,
            criterion,
            leaf_value,
            n_features,
            nodes: Vec::new(),
        };
        let mut root: Vec<usize> = indices.to_vec();
        builder.grow(&mut root, 0, rng);
        Self {
            nodes: builder.nodes,
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        loop {
            match self.nodes.get(node) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    node = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], node: usize) -> usize {
            match nodes.get(node) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

impl Builder<'_> {
    fn grow(&mut self, indices: &mut [usize], depth: usize, rng: &mut StdRng) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: (self.leaf_value)(&*indices),
        });

        if depth >= self.params.max_depth || indices.len() < self.params.min_samples_split.max(2) {
            return id;
        }

        let Some(split) = self.best_split(indices, rng) else {
            return id;
        };

        // Partition in place: left side first, order preserved
        indices.sort_by_key(|&i| self.rows[i][split.feature] > split.threshold);
        let n_left = indices
            .iter()
            .filter(|&&i| self.rows[i][split.feature] <= split.threshold)
            .count();
        let (left_idx, right_idx) = indices.split_at_mut(n_left);

        let left = self.grow(left_idx, depth + 1, rng);
        let right = self.grow(right_idx, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, indices: &[usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let n = indices.len() as f64;
        let (sum, sum_sq) = indices.iter().fold((0.0, 0.0), |(s, q), &i| {
            let t = self.targets[i];
            (s + t, q + t * t)
        });
        let parent = self.criterion.impurity(n, sum, sum_sq);
        if parent <= 1e-12 {
            return None;
        }

        let mut features: Vec<usize> = match self.params.max_features {
            Some(k) if k < self.n_features => {
                index::sample(rng, self.n_features, k.max(1)).into_vec()
            }
            _ => (0..self.n_features).collect(),
        };
        features.sort_unstable();

        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for feature in features {
            sorted.sort_by(|&a, &b| {
                self.rows[a][feature]
                    .partial_cmp(&self.rows[b][feature])
                    .unwrap_or(Ordering::Equal)
            });

            let (mut left_sum, mut left_sq) = (0.0, 0.0);
            for pos in 0..sorted.len() - 1 {
                let t = self.targets[sorted[pos]];
                left_sum += t;
                left_sq += t * t;

                let n_left = pos + 1;
                let n_right = sorted.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let here = self.rows[sorted[pos]][feature];
                let next = self.rows[sorted[pos + 1]][feature];
                if next <= here {
                    continue;
                }

                let impurity = self.criterion.impurity(n_left as f64, left_sum, left_sq)
                    + self.criterion.impurity(
                        n_right as f64,
                        sum - left_sum,
                        sum_sq - left_sq,
                    );
                let gain = parent - impurity;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}
