//! Linear support vector classifier backed by `linfa-svm`.
//!
//! Without probability mode the fitted machine only yields margins. With
//! it, linfa calibrates the margins by Platt scaling during the fit.

use linfa::dataset::Pr;
use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::{
    check_rows, check_training_input, estimator_error, records, ModelError, ModelFamily,
    ModelParams, ModelResult, TrainableModel,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    /// Penalty on margin violations, applied to both classes.
    pub c: f64,
    /// Solver stopping tolerance.
    pub eps: f64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self { c: 1.0, eps: 1e-3 }
    }
}

#[derive(Debug, Clone, Serialize)]
enum FittedSvm {
    Margin(Svm<f64, bool>),
    Calibrated(Svm<f64, Pr>),
}

#[derive(Debug, Clone, Serialize)]
pub struct LinearSvm {
    params: SvmParams,
    probability: bool,
    n_features: usize,
    fitted: Option<FittedSvm>,
}

impl LinearSvm {
    pub fn new(params: SvmParams) -> Self {
        Self {
            params,
            probability: false,
            n_features: 0,
            fitted: None,
        }
    }
}

impl TrainableModel for LinearSvm {
    fn family(&self) -> ModelFamily {
        ModelFamily::LinearSvm
    }

    fn params(&self) -> ModelParams {
        ModelParams::LinearSvm(self.params.clone())
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[bool]) -> ModelResult<()> {
        self.params().validate()?;
        let n_features = check_training_input(x, y)?;

        let targets: Array1<bool> = y.iter().copied().collect();
        let dataset = Dataset::new(records(x, n_features)?, targets);
        let (c, eps) = (self.params.c, self.params.eps);
        let fitted = if self.probability {
            Svm::<f64, Pr>::params()
                .pos_neg_weights(c, c)
                .eps(eps)
                .linear_kernel()
                .fit(&dataset)
                .map(FittedSvm::Calibrated)
        } else {
            Svm::<f64, bool>::params()
                .pos_neg_weights(c, c)
                .eps(eps)
                .linear_kernel()
                .fit(&dataset)
                .map(FittedSvm::Margin)
        }
        .map_err(|e| estimator_error(ModelFamily::LinearSvm, e))?;

        self.n_features = n_features;
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        let FittedSvm::Calibrated(svm) = fitted else {
            return Err(ModelError::ProbabilityDisabled);
        };
        check_rows(x, self.n_features, "prediction features")?;
        if x.is_empty() {
            return Ok(Vec::new());
        }

        let proba: Array1<Pr> = svm.predict(&records(x, self.n_features)?);
        Ok(proba.iter().map(|p| f64::from(**p)).collect())
    }

    fn set_probability(&mut self, enabled: bool) {
        self.probability = enabled;
    }

    /// The separating hyperplane, read back one unit vector at a time.
    fn coefficients(&self) -> Option<Vec<f64>> {
        let fitted = self.fitted.as_ref()?;
        let weights = (0..self.n_features)
            .map(|j| {
                let mut unit = Array1::<f64>::zeros(self.n_features);
                unit[j] = 1.0;
                match fitted {
                    FittedSvm::Margin(svm) => svm.weighted_sum(&unit),
                    FittedSvm::Calibrated(svm) => svm.weighted_sum(&unit),
                }
            })
            .collect();
        Some(weights)
    }

    fn snapshot(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Class follows feature 0; feature 1 is noise.
    fn data() -> (Vec<Vec<f64>>, Vec<bool>) {
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![i as f64 / 2.0 - 5.0, ((i * 7) % 5) as f64 / 10.0])
            .collect();
        let y = (0..20).map(|i| i >= 10).collect();
        (x, y)
    }

    #[test]
    fn test_probability_disabled_by_default() {
        let (x, y) = data();
        let mut svm = LinearSvm::new(SvmParams::default());
        svm.fit(&x, &y).unwrap();

        assert!(matches!(
            svm.predict_proba(&x),
            Err(ModelError::ProbabilityDisabled)
        ));
        assert!(svm.coefficients().unwrap()[0] > 0.0);
    }

    #[test]
    fn test_platt_probabilities_follow_margins() {
        let (x, y) = data();
        let mut svm = LinearSvm::new(SvmParams::default());
        svm.set_probability(true);
        svm.fit(&x, &y).unwrap();

        let proba = svm.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(proba[0] < proba[19]);
        assert!(proba[0] < 0.5);
        assert!(proba[19] > 0.5);

        let coef = svm.coefficients().unwrap();
        assert_eq!(coef.len(), 2);
        assert!(coef[0] > 0.0);
        assert!(coef[0].abs() > coef[1].abs());
    }

    #[test]
    fn test_unfitted() {
        let mut svm = LinearSvm::new(SvmParams::default());
        svm.set_probability(true);
        assert!(matches!(
            svm.predict_proba(&[vec![0.0, 0.0]]),
            Err(ModelError::NotFitted)
        ));
        assert!(svm.coefficients().is_none());
    }

    #[test]
    fn test_invalid_eps() {
        let (x, y) = data();
        let mut svm = LinearSvm::new(SvmParams { c: 1.0, eps: 0.0 });
        assert!(matches!(
            svm.fit(&x, &y),
            Err(ModelError::InvalidParameter(_))
        ));
    }
}
