//! Experiment registry.
//!
//! At most one experiment per name. Every trained configuration becomes its
//! own immutable record keyed by `(experiment_name, configuration_index)`,
//! with artifacts written under the record id as the [`ArtifactPolicy`]
//! allows. Artifacts go first and the record last, so a record only exists
//! once everything it points to has been written.

pub mod artifacts;
pub mod record;

use std::collections::HashSet;
use std::path::Path;

use polars::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::data::{Dataset, RowKey};
use crate::models::TrainableModel;
use crate::preprocessing::Preprocessor;

pub use artifacts::{ArtifactKind, ArtifactSink, FsArtifactSink, MemoryArtifactSink, OutputLayout};
pub use record::{
    ExperimentRecord, JsonFileStore, MemoryRecordStore, RecordId, RecordStore, StoredRecord,
};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Record {index} of experiment '{name}' already exists")]
    DuplicateRecord { name: String, index: usize },

    #[error("Record id {0} was issued twice")]
    IdCollision(String),

    #[error("Invalid experiment name '{0}'")]
    InvalidName(String),

    #[error("Snapshot failed: {0}")]
    Snapshot(String),
}

impl RegistryError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Which artifacts accompany a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactPolicy {
    /// Per-row test predictions as CSV.
    pub predictions: bool,
    /// Fitted model, imputer and scaler as JSON.
    pub snapshots: bool,
}

impl Default for ArtifactPolicy {
    fn default() -> Self {
        Self {
            predictions: true,
            snapshots: false,
        }
    }
}

/// Outputs of one configuration that may be persisted next to its record.
pub struct RunArtifacts<'a> {
    pub index: &'a [RowKey],
    pub labels: &'a [bool],
    pub scores: &'a [f64],
    pub model: &'a dyn TrainableModel,
    pub preprocessor: &'a Preprocessor,
}

impl RunArtifacts<'_> {
    /// `entity_id, inspection_date, true_label, predicted_score`.
    pub fn predictions_frame(&self) -> PolarsResult<DataFrame> {
        let ids: Vec<&str> = self.index.iter().map(|k| k.entity_id.as_str()).collect();
        let dates: Vec<String> = self
            .index
            .iter()
            .map(|k| k.inspection_date.to_string())
            .collect();
        let labels: Vec<i32> = self.labels.iter().map(|&l| i32::from(l)).collect();

        DataFrame::new(vec![
            Series::new("entity_id".into(), ids).into(),
            Series::new("inspection_date".into(), dates).into(),
            Series::new("true_label".into(), labels).into(),
            Series::new("predicted_score".into(), self.scores.to_vec()).into(),
        ])
    }
}

/// Record store plus artifact sink under one policy.
pub struct ExperimentRegistry<S: RecordStore, A: ArtifactSink> {
    store: S,
    sink: A,
    policy: ArtifactPolicy,
    issued: HashSet<RecordId>,
}

impl<S: RecordStore, A: ArtifactSink> ExperimentRegistry<S, A> {
    pub fn new(store: S, sink: A, policy: ArtifactPolicy) -> Self {
        Self {
            store,
            sink,
            policy,
            issued: HashSet::new(),
        }
    }

    pub fn exists(&self, experiment_name: &str) -> RegistryResult<bool> {
        self.store.exists(experiment_name)
    }

    /// Persist a configuration's artifacts, then its record.
    pub fn create(
        &mut self,
        record: &ExperimentRecord,
        artifacts: &RunArtifacts<'_>,
    ) -> RegistryResult<RecordId> {
        let id = self.store.allocate_id();
        if !self.issued.insert(id.clone()) {
            return Err(RegistryError::IdCollision(id.to_string()));
        }

        if self.policy.predictions {
            let mut df = artifacts.predictions_frame()?;
            self.sink
                .write_csv(ArtifactKind::Predictions, &format!("{}.csv", id), &mut df)?;
        }

        if self.policy.snapshots {
            let model = artifacts
                .model
                .snapshot()
                .map_err(|e| RegistryError::Snapshot(e.to_string()))?;
            let imputer = serde_json::to_vec(&artifacts.preprocessor.imputer)?;
            let scaler = serde_json::to_vec(&artifacts.preprocessor.scaler)?;

            let file_name = format!("{}.json", id);
            self.sink
                .write_binary(ArtifactKind::Model, &file_name, &model)?;
            self.sink
                .write_binary(ArtifactKind::Imputer, &file_name, &imputer)?;
            self.sink
                .write_binary(ArtifactKind::Scaler, &file_name, &scaler)?;
        }

        self.store.insert(&id, record)?;
        info!(
            "Logged {} #{} as {}",
            record.experiment_name, record.configuration_index, id
        );
        Ok(id)
    }

    /// Write a dataset before imputation and scaling.
    pub fn dump_dataset(
        &mut self,
        experiment_name: &str,
        split: &str,
        dataset: &Dataset,
    ) -> RegistryResult<()> {
        let mut df = dataset.to_dataframe()?;
        self.sink.write_csv(
            ArtifactKind::Dump,
            &format!("{}_{}.csv", experiment_name, split),
            &mut df,
        )
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }
}
