//! Experiment orchestration.
//!
//! config -> temporal bounds -> train/test datasets -> quality gate ->
//! imputation and scaling -> grid -> train/evaluate -> registry.

pub mod runner;
pub mod train_eval;

use std::fmt;

use serde::Serialize;

use crate::metrics::{EvaluationResult, PRECISION_CUTOFFS};
use crate::models::ModelFamily;
use crate::registry::RecordId;
use crate::validation::{QualityReport, TemporalWindow};

pub use runner::{ExperimentRunner, RunOptions};
pub use train_eval::{extract_importances, StageFailure, TrainEvalLoop, TrainedModel};

/// Lifecycle of one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Instantiating,
    Fitting,
    Predicting,
    Evaluating,
    Logged,
    Skipped,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Instantiating => "instantiating",
            Stage::Fitting => "fitting",
            Stage::Predicting => "predicting",
            Stage::Evaluating => "evaluating",
            Stage::Logged => "logged",
            Stage::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// How a configuration ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConfigurationStatus {
    Logged(RecordId),
    /// Evaluated but not persisted.
    Skipped,
    Failed { stage: Stage, reason: String },
}

impl ConfigurationStatus {
    pub fn stage(&self) -> Stage {
        match self {
            ConfigurationStatus::Logged(_) => Stage::Logged,
            ConfigurationStatus::Skipped => Stage::Skipped,
            ConfigurationStatus::Failed { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationOutcome {
    pub index: usize,
    pub family: ModelFamily,
    pub key: String,
    pub status: ConfigurationStatus,
    pub evaluation: Option<EvaluationResult>,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub experiment_name: String,
    pub window: TemporalWindow,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_quality: QualityReport,
    pub test_quality: QualityReport,
    pub outcomes: Vec<ConfigurationOutcome>,
}

impl RunReport {
    pub fn logged(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ConfigurationStatus::Logged(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ConfigurationStatus::Failed { .. }))
            .count()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Experiment {}\n\
             Train: {} ({} rows)\n\
             Test:  {} ({} rows, window {})\n\
             Configurations: {} ({} logged, {} failed)\n\n",
            self.experiment_name,
            self.window.train,
            self.train_rows,
            self.window.test,
            self.test_rows,
            self.window.validation_window,
            self.outcomes.len(),
            self.logged(),
            self.failed()
        ));

        out.push_str("|  # | Model                          | Status     |");
        for cutoff in PRECISION_CUTOFFS {
            out.push_str(&format!(" P@{:>2.0}%  |", cutoff * 100.0));
        }
        out.push('\n');

        for outcome in &self.outcomes {
            out.push_str(&format!(
                "| {:>2} | {:<30} | {:<10} |",
                outcome.index,
                outcome.key,
                outcome.status.stage()
            ));
            for cutoff in PRECISION_CUTOFFS {
                let value = outcome
                    .evaluation
                    .as_ref()
                    .and_then(|e| e.precision_at(cutoff));
                match value {
                    Some(v) => out.push_str(&format!(" {:>6.3} |", v)),
                    None => out.push_str("    n/a |"),
                }
            }
            out.push('\n');

            if let ConfigurationStatus::Failed { reason, .. } = &outcome.status {
                out.push_str(&format!("     {}\n", reason));
            }
        }

        out
    }
}
