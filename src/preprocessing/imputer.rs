use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::data::{observed, Dataset, Matrix};

/// Replaces missing values with the training mean of their column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanImputer {
    means: Vec<f64>,
}

impl MeanImputer {
    /// Column means over observed (present, finite) values. A column with
    /// none imputes to 0.
    pub fn fit(dataset: &Dataset) -> Self {
        let means = (0..dataset.n_features())
            .map(|j| {
                let observed: Vec<f64> = dataset.column(j).flatten().collect();
                if observed.is_empty() {
                    0.0
                } else {
                    observed.mean()
                }
            })
            .collect();
        Self { means }
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn transform(&self, dataset: &Dataset) -> Matrix {
        dataset
            .x()
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.means)
                    .map(|(&value, mean)| observed(value).unwrap_or(*mean))
                    .collect()
            })
            .collect()
    }
}
