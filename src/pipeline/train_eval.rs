//! Fit, predict and evaluate one configuration.

use tracing::{debug, warn};

use crate::data::Matrix;
use crate::metrics::{EvaluationResult, Evaluator};
use crate::models::{ImportanceKind, ModelConfiguration, ModelError, TrainableModel};

use super::Stage;

/// A fitted model with its test scores and evaluation.
pub struct TrainedModel {
    pub model: Box<dyn TrainableModel>,
    pub scores: Vec<f64>,
    pub evaluation: EvaluationResult,
}

/// Where and why a configuration stopped.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: ModelError,
}

/// Preprocessed train/test matrices shared by every configuration.
pub struct TrainEvalLoop<'a> {
    pub train_x: &'a Matrix,
    pub train_y: &'a [bool],
    pub test_x: &'a Matrix,
    pub test_y: &'a [bool],
    pub feature_names: &'a [String],
    pub n_jobs: usize,
}

impl TrainEvalLoop<'_> {
    pub fn train_and_evaluate(
        &self,
        configuration: &ModelConfiguration,
    ) -> Result<TrainedModel, StageFailure> {
        let model = configuration
            .instantiate(self.n_jobs)
            .map_err(|error| StageFailure {
                stage: Stage::Instantiating,
                error,
            })?;
        debug!("{}: {:?}", Stage::Instantiating, configuration.params);

        self.fit_and_evaluate(model, configuration.importance)
    }

    /// Run an instantiated model through the remaining stages.
    pub fn fit_and_evaluate(
        &self,
        mut model: Box<dyn TrainableModel>,
        importance: ImportanceKind,
    ) -> Result<TrainedModel, StageFailure> {
        model
            .fit(self.train_x, self.train_y)
            .map_err(|error| StageFailure {
                stage: Stage::Fitting,
                error,
            })?;

        let scores = model
            .predict_proba(self.test_x)
            .and_then(|scores| check_count(scores, self.test_x.len()))
            .map_err(|error| StageFailure {
                stage: Stage::Predicting,
                error,
            })?;

        check_scores(&scores).map_err(|error| StageFailure {
            stage: Stage::Evaluating,
            error,
        })?;
        let importances =
            extract_importances(model.as_ref(), importance, self.feature_names.len());
        let evaluation = Evaluator::evaluate(
            self.test_y,
            &scores,
            self.feature_names,
            importances.as_deref(),
        );

        Ok(TrainedModel {
            model,
            scores,
            evaluation,
        })
    }
}

fn check_count(scores: Vec<f64>, expected: usize) -> Result<Vec<f64>, ModelError> {
    if scores.len() != expected {
        return Err(ModelError::PredictionCount {
            expected,
            got: scores.len(),
        });
    }
    Ok(scores)
}

/// Scores are ranked and thresholded at 0.5, so each must be a probability.
fn check_scores(scores: &[f64]) -> Result<(), ModelError> {
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ModelError::NonFinite("predicted scores"));
    }
    match scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
        Some(&score) => Err(ModelError::ScoreOutOfRange(score)),
        None => Ok(()),
    }
}

/// Read importances the way the configuration's tag says. Absent or
/// misaligned values are reported as unavailable.
pub fn extract_importances(
    model: &dyn TrainableModel,
    kind: ImportanceKind,
    n_features: usize,
) -> Option<Vec<f64>> {
    let values = match kind {
        ImportanceKind::FeatureImportances => model.feature_importances(),
        ImportanceKind::Coefficients => model.coefficients(),
        ImportanceKind::Unavailable => None,
    }?;

    if values.len() != n_features {
        warn!(
            "{} returned {} importances for {} features, ignoring",
            model.family(),
            values.len(),
            n_features
        );
        return None;
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogisticParams, ModelFamily, ModelParams, ModelResult, SvmParams};

    /// Fits anything and scores every row with a fixed value.
    struct ConstantModel(f64);

    impl TrainableModel for ConstantModel {
        fn family(&self) -> ModelFamily {
            ModelFamily::LogisticRegression
        }

        fn params(&self) -> ModelParams {
            ModelParams::LogisticRegression(LogisticParams::default())
        }

        fn fit(&mut self, _: &[Vec<f64>], _: &[bool]) -> ModelResult<()> {
            Ok(())
        }

        fn predict_proba(&self, x: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
            Ok(vec![self.0; x.len()])
        }

        fn snapshot(&self) -> ModelResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn matrices() -> (Matrix, Vec<bool>, Vec<String>) {
        let x = vec![vec![-2.0], vec![-1.0], vec![1.0], vec![2.0]];
        let y = vec![false, false, true, true];
        (x, y, vec!["rate".to_string()])
    }

    /// Train and test on the same rows.
    fn in_sample<'a>(x: &'a Matrix, y: &'a [bool], names: &'a [String]) -> TrainEvalLoop<'a> {
        TrainEvalLoop {
            train_x: x,
            train_y: y,
            test_x: x,
            test_y: y,
            feature_names: names,
            n_jobs: 1,
        }
    }

    fn logistic() -> ModelConfiguration {
        ModelConfiguration::new(ModelParams::LogisticRegression(LogisticParams::default()))
    }

    #[test]
    fn test_logistic_configuration_is_evaluated() {
        let (x, y, names) = matrices();
        let trained = in_sample(&x, &y, &names)
            .train_and_evaluate(&logistic())
            .unwrap();

        assert_eq!(trained.scores.len(), 4);
        assert_eq!(trained.evaluation.confusion.tp, 2);
        let importances = trained.evaluation.feature_importances.unwrap();
        assert_eq!(importances[0].feature, "rate");
    }

    #[test]
    fn test_invalid_params_fail_at_instantiation() {
        let (x, y, names) = matrices();
        let config = ModelConfiguration::new(ModelParams::LogisticRegression(LogisticParams {
            c: -1.0,
            ..LogisticParams::default()
        }));

        let failure = in_sample(&x, &y, &names)
            .train_and_evaluate(&config)
            .err()
            .unwrap();
        assert_eq!(failure.stage, Stage::Instantiating);
        assert!(matches!(failure.error, ModelError::InvalidParameter(_)));
    }

    #[test]
    fn test_fit_failure_reports_stage() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![true, true];
        let names = vec!["rate".to_string()];
        let config = ModelConfiguration::new(ModelParams::LinearSvm(SvmParams::default()));

        let failure = in_sample(&x, &y, &names)
            .train_and_evaluate(&config)
            .err()
            .unwrap();
        assert_eq!(failure.stage, Stage::Fitting);
        assert!(matches!(failure.error, ModelError::SingleClass));
    }

    #[test]
    fn test_scores_outside_unit_interval_fail_evaluation() {
        let (x, y, names) = matrices();
        let train_eval = in_sample(&x, &y, &names);
        let run = |score: f64| {
            train_eval.fit_and_evaluate(Box::new(ConstantModel(score)), ImportanceKind::Unavailable)
        };

        let failure = run(1.5).err().unwrap();
        assert_eq!(failure.stage, Stage::Evaluating);
        assert!(matches!(failure.error, ModelError::ScoreOutOfRange(s) if s == 1.5));
        assert_eq!(run(f64::NAN).err().unwrap().stage, Stage::Evaluating);
        assert_eq!(run(0.5).unwrap().scores, vec![0.5; 4]);
    }

    #[test]
    fn test_empty_test_set_is_evaluated() {
        let (x, y, names) = matrices();
        let empty: Matrix = Vec::new();
        let train_eval = TrainEvalLoop {
            test_x: &empty,
            test_y: &[],
            ..in_sample(&x, &y, &names)
        };

        let trained = train_eval.train_and_evaluate(&logistic()).unwrap();
        assert!(trained.scores.is_empty());
        assert!(trained
            .evaluation
            .precision_at
            .iter()
            .all(|p| p.precision.is_none()));
    }

    #[test]
    fn test_unavailable_tag_skips_extraction() {
        let (x, y, _) = matrices();
        let mut model = logistic().instantiate(1).unwrap();
        model.fit(&x, &y).unwrap();

        assert!(extract_importances(model.as_ref(), ImportanceKind::Unavailable, 1).is_none());
        assert!(extract_importances(model.as_ref(), ImportanceKind::FeatureImportances, 1).is_none());
        assert!(extract_importances(model.as_ref(), ImportanceKind::Coefficients, 2).is_none());
        assert_eq!(
            extract_importances(model.as_ref(), ImportanceKind::Coefficients, 1)
                .unwrap()
                .len(),
            1
        );
    }
}
