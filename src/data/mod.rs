//! Feature store access and dataset assembly.

pub mod builder;
pub mod dataset;
pub mod loader;
pub mod store;

pub use builder::DatasetBuilder;
pub use dataset::{
    observed, Dataset, DateRange, FeatureColumn, FeatureRow, FeatureRows, FeatureSpec, Matrix,
    RowKey,
};
pub use loader::ParquetFeatureStore;
pub use store::{
    FeatureStore, FeatureStoreError, InMemoryFeatureStore, StoreResult, GROUND_TRUTH_COLUMN,
    GROUND_TRUTH_TABLE,
};
