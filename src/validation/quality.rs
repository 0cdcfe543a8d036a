//! Missing-value quality gate.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::Dataset;
use crate::error::{ExperimentError, ExperimentResult};

/// Highest tolerated share of missing values in a column.
pub const DEFAULT_MISSING_THRESHOLD: f64 = 0.5;

/// Missing-value share of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub proportion: f64,
}

/// Per-column missing proportions, in column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub rows: usize,
    pub threshold: f64,
    pub columns: Vec<ColumnMissing>,
}

impl QualityReport {
    pub fn violations(&self) -> Vec<&ColumnMissing> {
        self.columns
            .iter()
            .filter(|c| c.proportion > self.threshold)
            .collect()
    }

    pub fn summary(&self) -> String {
        let worst = self
            .columns
            .iter()
            .max_by(|a, b| a.proportion.total_cmp(&b.proportion));
        match worst {
            Some(c) => format!(
                "{} rows, {} columns: {} over threshold {:.2} (worst {} at {:.2})",
                self.rows,
                self.columns.len(),
                self.violations().len(),
                self.threshold,
                c.column,
                c.proportion
            ),
            None => format!("{} rows, no feature columns", self.rows),
        }
    }
}

/// Rejects datasets with too many missing values in any column.
#[derive(Debug, Clone, Copy)]
pub struct QualityGate {
    threshold: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(DEFAULT_MISSING_THRESHOLD)
    }
}

impl QualityGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Missing-value share per column. Zero for every column of an empty dataset.
    pub fn proportions(dataset: &Dataset) -> Vec<ColumnMissing> {
        let rows = dataset.n_rows();
        dataset
            .feature_names()
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let missing = dataset.column(j).filter(|v| v.is_none()).count();
                let proportion = if rows == 0 {
                    0.0
                } else {
                    missing as f64 / rows as f64
                };
                ColumnMissing {
                    column: name.clone(),
                    proportion,
                }
            })
            .collect()
    }

    /// Build the report, failing on the first column over the threshold.
    pub fn check(&self, dataset: &Dataset) -> ExperimentResult<QualityReport> {
        let report = QualityReport {
            rows: dataset.n_rows(),
            threshold: self.threshold,
            columns: Self::proportions(dataset),
        };

        let violations = report.violations();
        if let Some(first) = violations.first() {
            for v in &violations {
                warn!("{} is {:.2} missing", v.column, v.proportion);
            }
            return Err(ExperimentError::Quality {
                column: first.column.clone(),
                proportion: first.proportion,
                threshold: self.threshold,
                violations: violations.len(),
            });
        }

        info!("Quality gate passed: {}", report.summary());
        Ok(report)
    }
}
