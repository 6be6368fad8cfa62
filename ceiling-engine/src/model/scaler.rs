//! Per-feature standardisation.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::ModelError;

/// Zero-mean, unit-variance scaling fitted on training rows.
///
/// Features with zero variance keep a unit scale so they pass through
/// centred but unscaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, ModelError> {
        let width = rows.first().map(|r| r.len()).ok_or(ModelError::NotTrained)?;
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ModelError::FeatureArity {
                expected: width,
                got: bad.len(),
            });
        }

        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);
        for col in 0..width {
            let column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            let mean = column.iter().mean();
            let std = column.iter().population_std_dev();
            means.push(mean);
            scales.push(if std.is_finite() && std > 1e-12 { std } else { 1.0 });
        }

        Ok(Self { means, scales })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        if row.len() != self.means.len() {
            return Err(ModelError::FeatureArity {
                expected: self.means.len(),
                got: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_transform() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        let t = scaler.transform(&[3.0, 5.0]).unwrap();
        assert!((t[0] - 1.0).abs() < 0.001);
        // zero variance column is centred only
        assert_eq!(t[1], 0.0);
        assert_eq!(scaler.transform(&[9.0, 7.0]).unwrap()[1], 2.0);
    }

    #[test]
    fn test_transform_arity() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert_eq!(
            scaler.transform(&[1.0]),
            Err(ModelError::FeatureArity { expected: 2, got: 1 })
        );
    }

    #[test]
    fn test_fit_rejects_ragged_rows() {
        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            StandardScaler::fit(&rows),
            Err(ModelError::FeatureArity { .. })
        ));
        assert!(StandardScaler::fit(&[]).is_err());
    }
}
