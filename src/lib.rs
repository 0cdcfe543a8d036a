pub mod config;
pub mod data;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod registry;
pub mod validation;

// Re-export commonly used types
pub use config::{ConfigError, ExperimentConfig};
pub use data::{
    Dataset, DatasetBuilder, DateRange, FeatureSpec, FeatureStore, InMemoryFeatureStore,
    ParquetFeatureStore,
};
pub use error::{ExperimentError, ExperimentResult};
pub use grid::GridExpander;
pub use metrics::{EvaluationResult, Evaluator};
pub use models::{ModelConfiguration, ModelFamily, TrainableModel};
pub use pipeline::{ExperimentRunner, RunOptions, RunReport};
pub use preprocessing::Preprocessor;
pub use registry::{
    ArtifactPolicy, ExperimentRegistry, FsArtifactSink, JsonFileStore, OutputLayout,
};
pub use validation::{QualityGate, TemporalBoundaryValidator, TemporalWindow, ValidationWindow};
