//! L2-regularized logistic regression backed by `linfa-logistic`.

use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression as LinfaLogistic};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    check_rows, check_training_input, estimator_error, records, ModelError, ModelFamily,
    ModelParams, ModelResult, TrainableModel,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: u64,
    /// Gradient norm at which the solver stops.
    pub tol: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 500,
            tol: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogisticRegression {
    params: LogisticParams,
    n_features: usize,
    fitted: Option<FittedLogisticRegression<f64, bool>>,
}

impl LogisticRegression {
    pub fn new(params: LogisticParams) -> Self {
        Self {
            params,
            n_features: 0,
            fitted: None,
        }
    }

    fn fitted(&self) -> ModelResult<&FittedLogisticRegression<f64, bool>> {
        self.fitted.as_ref().ok_or(ModelError::NotFitted)
    }
}

/// linfa chooses its own positive class from the training labels. Scores
/// and weights are flipped so they always refer to `true`.
fn positive_is_true(fitted: &FittedLogisticRegression<f64, bool>) -> bool {
    fitted.labels().pos.class
}

impl TrainableModel for LogisticRegression {
    fn family(&self) -> ModelFamily {
        ModelFamily::LogisticRegression
    }

    fn params(&self) -> ModelParams {
        ModelParams::LogisticRegression(self.params.clone())
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[bool]) -> ModelResult<()> {
        self.params().validate()?;
        let n_features = check_training_input(x, y)?;

        let targets: Array1<bool> = y.iter().copied().collect();
        let dataset = Dataset::new(records(x, n_features)?, targets);
        let fitted = LinfaLogistic::default()
            .alpha(1.0 / self.params.c)
            .max_iterations(self.params.max_iter)
            .gradient_tolerance(self.params.tol)
            .with_intercept(true)
            .fit(&dataset)
            .map_err(|e| estimator_error(ModelFamily::LogisticRegression, e))?;

        if fitted.params().iter().any(|w| !w.is_finite()) || !fitted.intercept().is_finite() {
            return Err(ModelError::NonFinite("fitted coefficients"));
        }
        debug!("Logistic fit on {} rows, C = {}", x.len(), self.params.c);

        self.n_features = n_features;
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        let fitted = self.fitted()?;
        check_rows(x, self.n_features, "prediction features")?;
        if x.is_empty() {
            return Ok(Vec::new());
        }

        let proba = fitted.predict_probabilities(&records(x, self.n_features)?);
        let flip = !positive_is_true(fitted);
        Ok(proba
            .iter()
            .map(|&p| if flip { 1.0 - p } else { p })
            .collect())
    }

    fn coefficients(&self) -> Option<Vec<f64>> {
        let fitted = self.fitted.as_ref()?;
        let sign = if positive_is_true(fitted) { 1.0 } else { -1.0 };
        Some(fitted.params().iter().map(|w| sign * w).collect())
    }

    fn snapshot(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<Vec<f64>>, Vec<bool>) {
        let x = vec![
            vec![-2.0, 0.1],
            vec![-1.5, -0.2],
            vec![-1.0, 0.3],
            vec![-0.5, 0.0],
            vec![1.0, -0.1],
            vec![1.5, 0.2],
            vec![2.0, 0.0],
        ];
        let y = vec![false, false, false, false, true, true, true];
        (x, y)
    }

    #[test]
    fn test_fit_ranks_positives_higher() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(LogisticParams::default());
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[..4].iter().all(|&p| p < 0.5));
        assert!(proba[4..].iter().all(|&p| p > 0.5));

        let coef = model.coefficients().unwrap();
        assert!(coef[0] > 0.0);
        assert!(coef[0].abs() > coef[1].abs());
    }

    #[test]
    fn test_scores_refer_to_positive_class_when_positives_dominate() {
        let (x, y) = separable();
        let flipped: Vec<bool> = y.iter().map(|label| !label).collect();
        let mut model = LogisticRegression::new(LogisticParams::default());
        model.fit(&x, &flipped).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] > proba[6]);
        assert!(model.coefficients().unwrap()[0] < 0.0);
    }

    #[test]
    fn test_stronger_regularization_shrinks_weights() {
        let (x, y) = separable();
        let mut loose = LogisticRegression::new(LogisticParams {
            c: 10.0,
            ..LogisticParams::default()
        });
        let mut tight = LogisticRegression::new(LogisticParams {
            c: 0.01,
            ..LogisticParams::default()
        });
        loose.fit(&x, &y).unwrap();
        tight.fit(&x, &y).unwrap();

        assert!(tight.coefficients().unwrap()[0] < loose.coefficients().unwrap()[0]);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::new(LogisticParams::default());
        assert!(matches!(
            model.predict_proba(&[vec![1.0]]),
            Err(ModelError::NotFitted)
        ));
        assert!(model.coefficients().is_none());
    }

    #[test]
    fn test_invalid_c() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(LogisticParams {
            c: 0.0,
            ..LogisticParams::default()
        });
        assert!(matches!(
            model.fit(&x, &y),
            Err(ModelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_prediction_width_checked() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(LogisticParams::default());
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict_proba(&[vec![1.0]]),
            Err(ModelError::FeatureMismatch {
                expected: 2,
                got: 1
            })
        ));
        assert!(model.predict_proba(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_is_json() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(LogisticParams::default());
        model.fit(&x, &y).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&model.snapshot().unwrap()).unwrap();
        assert_eq!(value["params"]["c"], 1.0);
        assert_eq!(value["n_features"], 2);
    }
}
