//! Pipeline-level error type.
//!
//! Every fatal condition of a run surfaces as an [`ExperimentError`]. Only
//! [`ExperimentError::ModelFit`] is recovered from, per configuration.

use thiserror::Error;

use crate::config::ConfigError;
use crate::data::FeatureStoreError;
use crate::models::ModelError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Temporal bounds violated: {0}")]
    TemporalBounds(String),

    #[error("Dataset integrity violated: {0}")]
    DatasetIntegrity(String),

    #[error(
        "Quality gate failed: column '{column}' is {proportion:.2} missing \
         (threshold {threshold:.2}, {violations} column(s) over)"
    )]
    Quality {
        column: String,
        proportion: f64,
        threshold: f64,
        violations: usize,
    },

    #[error("Experiment '{0}' already exists in the registry")]
    ExperimentExists(String),

    #[error("Model fit failed for {configuration}: {source}")]
    ModelFit {
        configuration: String,
        #[source]
        source: ModelError,
    },

    #[error("Registry I/O failure: {0}")]
    RegistryIo(#[from] RegistryError),

    #[error("Feature store error: {0}")]
    FeatureStore(#[from] FeatureStoreError),
}

pub type ExperimentResult<T> = Result<T, ExperimentError>;
