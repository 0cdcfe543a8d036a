//! Train-only preprocessing: mean imputation followed by standard scaling.
//!
//! Both steps are fit once on the training set and applied unchanged to the
//! test set.

pub mod imputer;
pub mod scaler;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{Dataset, Matrix};

pub use imputer::MeanImputer;
pub use scaler::StandardScaler;

/// Fitted imputer and scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub imputer: MeanImputer,
    pub scaler: StandardScaler,
}

impl Preprocessor {
    /// Fit both steps on `train`.
    pub fn fit(train: &Dataset) -> Self {
        let imputer = MeanImputer::fit(train);
        let imputed = imputer.transform(train);
        let scaler = StandardScaler::fit(&imputed, train.n_features());
        debug!(
            "Fitted preprocessing on {} rows x {} features",
            train.n_rows(),
            train.n_features()
        );
        Self { imputer, scaler }
    }

    /// Impute then scale.
    pub fn transform(&self, dataset: &Dataset) -> Matrix {
        let mut matrix = self.imputer.transform(dataset);
        self.scaler.transform_in_place(&mut matrix);
        matrix
    }
}
