use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::data::Matrix;

/// Centers columns on their training mean and divides by the population
/// standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Fit on an imputed matrix with `n_features` columns. Constant columns
    /// get a scale of 1.
    pub fn fit(matrix: &Matrix, n_features: usize) -> Self {
        let mut means = Vec::with_capacity(n_features);
        let mut stds = Vec::with_capacity(n_features);

        for j in 0..n_features {
            let column: Vec<f64> = matrix.iter().map(|row| row[j]).collect();
            if column.is_empty() {
                means.push(0.0);
                stds.push(1.0);
                continue;
            }

            let std = column.iter().population_std_dev();
            means.push(column.iter().mean());
            stds.push(if std.is_finite() && std > 0.0 { std } else { 1.0 });
        }

        Self { means, stds }
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    pub fn transform_in_place(&self, matrix: &mut Matrix) {
        for row in matrix.iter_mut() {
            for ((value, mean), std) in row.iter_mut().zip(&self.means).zip(&self.stds) {
                *value = (*value - mean) / std;
            }
        }
    }
}
