//! Evaluation metrics.
//!
//! - Precision at population cutoffs, with the score at each cutoff
//! - Confusion matrix and the classification statistics derived from it
//! - Ranked feature importances

pub mod evaluation;

pub use evaluation::{
    ConfusionMatrix, EvaluationResult, Evaluator, FeatureWeight, PrecisionAtCutoff,
    PRECISION_CUTOFFS, PROBABILITY_CUTOFF,
};
