//! Candidate model families.
//!
//! Models are opaque to the pipeline: they fit on a dense matrix and
//! predict the probability of a positive outcome. Estimators come from
//! linfa; the wrappers here convert to `ndarray` and read importances.
//! Optional capabilities (parallelism hint, probability mode, importances)
//! are declared per family and only used when declared.

pub mod forest;
pub mod logistic;
pub mod svm;

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

pub use forest::{ForestParams, MaxFeatures, RandomForest};
pub use logistic::{LogisticParams, LogisticRegression};
pub use svm::{LinearSvm, SvmParams};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Training labels contain a single class")]
    SingleClass,

    #[error("{rows} feature rows but {labels} labels")]
    LabelCount { rows: usize, labels: usize },

    #[error("Expected {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Probability estimates are disabled for this model")]
    ProbabilityDisabled,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Non-finite values in {0}")]
    NonFinite(&'static str),

    #[error("Score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error("Expected {expected} predictions, got {got}")]
    PredictionCount { expected: usize, got: usize },

    #[error("{family} estimator failed: {reason}")]
    Estimator {
        family: ModelFamily,
        reason: String,
    },

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    RandomForest,
    LogisticRegression,
    LinearSvm,
}

/// How feature importances are read from a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportanceKind {
    FeatureImportances,
    Coefficients,
    Unavailable,
}

/// Optional behaviour a family supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Accepts a worker-count hint.
    pub parallelism: bool,
    /// Probability estimates must be switched on before fitting.
    pub probability_toggle: bool,
    pub importance: ImportanceKind,
}

impl ModelFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "RandomForest",
            ModelFamily::LogisticRegression => "LogisticRegression",
            ModelFamily::LinearSvm => "LinearSVM",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            ModelFamily::RandomForest => Capabilities {
                parallelism: true,
                probability_toggle: false,
                importance: ImportanceKind::FeatureImportances,
            },
            ModelFamily::LogisticRegression => Capabilities {
                parallelism: false,
                probability_toggle: false,
                importance: ImportanceKind::Coefficients,
            },
            ModelFamily::LinearSvm => Capabilities {
                parallelism: false,
                probability_toggle: true,
                importance: ImportanceKind::Coefficients,
            },
        }
    }
}

impl FromStr for ModelFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RandomForest" | "random_forest" | "RandomForestClassifier" => {
                Ok(ModelFamily::RandomForest)
            }
            "LogisticRegression" | "logistic_regression" => Ok(ModelFamily::LogisticRegression),
            "LinearSVM" | "LinearSvm" | "linear_svm" | "LinearSVC" | "SVC" => {
                Ok(ModelFamily::LinearSvm)
            }
            other => Err(ConfigError::UnknownModel(other.to_string())),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hyperparameters of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelParams {
    RandomForest(ForestParams),
    LogisticRegression(LogisticParams),
    LinearSvm(SvmParams),
}

impl ModelParams {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelParams::RandomForest(_) => ModelFamily::RandomForest,
            ModelParams::LogisticRegression(_) => ModelFamily::LogisticRegression,
            ModelParams::LinearSvm(_) => ModelFamily::LinearSvm,
        }
    }

    /// Short identifier for logs.
    pub fn key(&self) -> String {
        match self {
            ModelParams::RandomForest(p) => format!(
                "rf_n{}_d{}_s{}_{}",
                p.n_estimators,
                p.max_depth
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                p.min_samples_split,
                p.max_features
            ),
            ModelParams::LogisticRegression(p) => format!("lr_c{}", p.c),
            ModelParams::LinearSvm(p) => format!("svm_c{}_eps{}", p.c, p.eps),
        }
    }

    /// Reject values no estimator can be built from.
    pub fn validate(&self) -> ModelResult<()> {
        match self {
            ModelParams::RandomForest(p) => {
                if p.n_estimators == 0 {
                    return Err(ModelError::InvalidParameter(
                        "n_estimators must be at least 1".to_string(),
                    ));
                }
                if p.min_samples_split < 2 {
                    return Err(ModelError::InvalidParameter(format!(
                        "min_samples_split must be at least 2, got {}",
                        p.min_samples_split
                    )));
                }
                Ok(())
            }
            ModelParams::LogisticRegression(p) => positive("C", p.c),
            ModelParams::LinearSvm(p) => positive("C", p.c).and_then(|_| positive("eps", p.eps)),
        }
    }
}

fn positive(name: &str, value: f64) -> ModelResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidParameter(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

/// A trainable binary classifier.
pub trait TrainableModel: Send {
    fn family(&self) -> ModelFamily;

    /// Hyperparameters as fitted.
    fn params(&self) -> ModelParams;

    fn fit(&mut self, x: &[Vec<f64>], y: &[bool]) -> ModelResult<()>;

    /// Probability of the positive class, one per row.
    fn predict_proba(&self, x: &[Vec<f64>]) -> ModelResult<Vec<f64>>;

    /// Worker-count hint. Ignored unless the family declares parallelism.
    fn set_parallelism(&mut self, _n_jobs: usize) {}

    /// Switch probability estimates on or off.
    fn set_probability(&mut self, _enabled: bool) {}

    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    fn coefficients(&self) -> Option<Vec<f64>> {
        None
    }

    /// Serialized fitted state.
    fn snapshot(&self) -> ModelResult<Vec<u8>>;
}

/// One point of a family's hyperparameter grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfiguration {
    pub params: ModelParams,
    pub importance: ImportanceKind,
}

impl ModelConfiguration {
    pub fn new(params: ModelParams) -> Self {
        let importance = params.family().capabilities().importance;
        Self { params, importance }
    }

    pub fn family(&self) -> ModelFamily {
        self.params.family()
    }

    pub fn key(&self) -> String {
        self.params.key()
    }

    /// Build an unfitted model, applying declared capabilities.
    pub fn instantiate(&self, n_jobs: usize) -> ModelResult<Box<dyn TrainableModel>> {
        self.params.validate()?;
        let mut model: Box<dyn TrainableModel> = match &self.params {
            ModelParams::RandomForest(p) => Box::new(RandomForest::new(p.clone())),
            ModelParams::LogisticRegression(p) => Box::new(LogisticRegression::new(p.clone())),
            ModelParams::LinearSvm(p) => Box::new(LinearSvm::new(p.clone())),
        };

        let capabilities = self.family().capabilities();
        if capabilities.parallelism {
            model.set_parallelism(n_jobs);
        }
        if capabilities.probability_toggle {
            model.set_probability(true);
        }
        Ok(model)
    }
}

/// Validate a training set, returning its feature count.
pub(crate) fn check_training_input(x: &[Vec<f64>], y: &[bool]) -> ModelResult<usize> {
    if x.len() != y.len() {
        return Err(ModelError::LabelCount {
            rows: x.len(),
            labels: y.len(),
        });
    }
    let first = x.first().ok_or(ModelError::EmptyTrainingSet)?;
    let n_features = first.len();

    check_rows(x, n_features, "training features")?;

    let positives = y.iter().filter(|&&label| label).count();
    if positives == 0 || positives == y.len() {
        return Err(ModelError::SingleClass);
    }
    Ok(n_features)
}

/// Every row must have `n_features` finite values.
pub(crate) fn check_rows(
    x: &[Vec<f64>],
    n_features: usize,
    what: &'static str,
) -> ModelResult<()> {
    for row in x {
        if row.len() != n_features {
            return Err(ModelError::FeatureMismatch {
                expected: n_features,
                got: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite(what));
        }
    }
    Ok(())
}

/// Rows as an `ndarray` matrix of `n_features` columns.
pub(crate) fn records(x: &[Vec<f64>], n_features: usize) -> ModelResult<Array2<f64>> {
    Ok(Array2::from_shape_vec((x.len(), n_features), x.concat())?)
}

pub(crate) fn estimator_error(family: ModelFamily, err: impl fmt::Display) -> ModelError {
    ModelError::Estimator {
        family,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_aliases() {
        assert_eq!(
            "random_forest".parse::<ModelFamily>().unwrap(),
            ModelFamily::RandomForest
        );
        assert_eq!(
            "RandomForestClassifier".parse::<ModelFamily>().unwrap(),
            ModelFamily::RandomForest
        );
        assert_eq!("SVC".parse::<ModelFamily>().unwrap(), ModelFamily::LinearSvm);
        assert!(matches!(
            "GradientBoosting".parse::<ModelFamily>(),
            Err(ConfigError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_importance_tag_resolved_from_family() {
        let rf = ModelConfiguration::new(ModelParams::RandomForest(ForestParams::default()));
        assert_eq!(rf.importance, ImportanceKind::FeatureImportances);

        let svm = ModelConfiguration::new(ModelParams::LinearSvm(SvmParams::default()));
        assert_eq!(svm.importance, ImportanceKind::Coefficients);
    }

    #[test]
    fn test_instantiate_enables_svm_probability() {
        let config = ModelConfiguration::new(ModelParams::LinearSvm(SvmParams::default()));
        let mut model = config.instantiate(4).unwrap();
        let x: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64 - 5.5]).collect();
        let y: Vec<bool> = (0..12).map(|i| i >= 6).collect();
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 12);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_instantiate_rejects_invalid_params() {
        let svm =
            ModelConfiguration::new(ModelParams::LinearSvm(SvmParams { c: 1.0, eps: 0.0 }));
        assert!(matches!(
            svm.instantiate(1),
            Err(ModelError::InvalidParameter(_))
        ));

        let forest = ModelConfiguration::new(ModelParams::RandomForest(ForestParams {
            min_samples_split: 1,
            ..ForestParams::default()
        }));
        assert!(forest.instantiate(1).is_err());
    }

    #[test]
    fn test_training_input_checks() {
        assert!(matches!(
            check_training_input(&[], &[]),
            Err(ModelError::EmptyTrainingSet)
        ));
        assert!(matches!(
            check_training_input(&[vec![1.0], vec![2.0]], &[true, true]),
            Err(ModelError::SingleClass)
        ));
        assert!(matches!(
            check_training_input(&[vec![1.0], vec![2.0, 3.0]], &[true, false]),
            Err(ModelError::FeatureMismatch { .. })
        ));
        assert!(matches!(
            check_training_input(&[vec![f64::NAN], vec![2.0]], &[true, false]),
            Err(ModelError::NonFinite(_))
        ));
    }

    #[test]
    fn test_records_shape() {
        let x = records(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]], 2).unwrap();
        assert_eq!(x.dim(), (3, 2));
        assert_eq!(x[[2, 0]], 5.0);

        let empty = records(&[], 4).unwrap();
        assert_eq!(empty.dim(), (0, 4));
    }

    #[test]
    fn test_params_serialize_with_family_tag() {
        let params = ModelParams::LogisticRegression(LogisticParams::default());
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["family"], "logistic_regression");
    }
}
