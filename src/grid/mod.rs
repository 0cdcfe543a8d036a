//! Hyperparameter grids.
//!
//! Each family owns a value grid enumerated by nested loops in a fixed
//! order. The expander bounds it to the configured size.

pub mod expander;

use serde::{Deserialize, Serialize};

use crate::models::{ForestParams, LogisticParams, MaxFeatures, SvmParams};

pub use expander::GridExpander;

/// Random forest values to sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
}

impl Default for ForestGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![10, 50, 100],
            max_depth: vec![Some(5), Some(10), None],
            min_samples_split: vec![2, 10],
            max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Log2],
        }
    }
}

impl ForestGrid {
    pub fn total_combinations(&self) -> usize {
        self.n_estimators.len()
            * self.max_depth.len()
            * self.min_samples_split.len()
            * self.max_features.len()
    }

    /// All combinations; every tree ensemble shares `seed`.
    pub fn combinations(&self, seed: u64) -> Vec<ForestParams> {
        let mut combos = Vec::with_capacity(self.total_combinations());

        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &max_features in &self.max_features {
                        combos.push(ForestParams {
                            n_estimators,
                            max_depth,
                            min_samples_split,
                            max_features,
                            seed,
                        });
                    }
                }
            }
        }

        combos
    }
}

/// Logistic regression values to sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticGrid {
    pub c: Vec<f64>,
    pub max_iter: u64,
    pub tol: f64,
}

impl Default for LogisticGrid {
    fn default() -> Self {
        let defaults = LogisticParams::default();
        Self {
            c: vec![1.0, 0.1, 10.0, 0.01, 100.0, 0.001],
            max_iter: defaults.max_iter,
            tol: defaults.tol,
        }
    }
}

impl LogisticGrid {
    pub fn total_combinations(&self) -> usize {
        self.c.len()
    }

    pub fn combinations(&self) -> Vec<LogisticParams> {
        self.c
            .iter()
            .map(|&c| LogisticParams {
                c,
                max_iter: self.max_iter,
                tol: self.tol,
            })
            .collect()
    }
}

/// Linear SVM values to sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmGrid {
    pub c: Vec<f64>,
    pub eps: Vec<f64>,
}

impl Default for SvmGrid {
    fn default() -> Self {
        Self {
            c: vec![1.0, 0.1, 10.0, 0.01],
            eps: vec![1e-3, 1e-1],
        }
    }
}

impl SvmGrid {
    pub fn total_combinations(&self) -> usize {
        self.c.len() * self.eps.len()
    }

    pub fn combinations(&self) -> Vec<SvmParams> {
        let mut combos = Vec::with_capacity(self.total_combinations());
        for &c in &self.c {
            for &eps in &self.eps {
                combos.push(SvmParams { c, eps });
            }
        }
        combos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forest_enumeration_order() {
        let grid = ForestGrid::default();
        let combos = grid.combinations(3);
        assert_eq!(combos.len(), grid.total_combinations());
        assert_eq!(combos.len(), 36);

        assert_eq!(combos[0].n_estimators, 10);
        assert_eq!(combos[0].max_depth, Some(5));
        assert_eq!(combos[0].max_features, MaxFeatures::Sqrt);
        assert_eq!(combos[1].max_features, MaxFeatures::Log2);
        assert_eq!(combos[35].n_estimators, 100);
        assert_eq!(combos[35].max_depth, None);
        assert!(combos.iter().all(|p| p.seed == 3));
    }

    #[test]
    fn test_linear_grids() {
        assert_eq!(LogisticGrid::default().combinations().len(), 6);
        let svm = SvmGrid::default().combinations();
        assert_eq!(svm.len(), 8);
        assert_eq!(svm[0].c, 1.0);
        assert_eq!(svm[1].eps, 1e-1);
    }
}
