//! Experiment records and the stores that keep them.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::config::experiment::is_valid_experiment_name;
use crate::metrics::EvaluationResult;
use crate::models::{ModelFamily, ModelParams};

use super::{RegistryError, RegistryResult};

/// Identifier issued by a record store before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One trained and evaluated configuration. Never updated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_name: String,
    pub configuration_index: usize,
    /// Experiment configuration as loaded.
    pub config: serde_json::Value,
    pub model_family: ModelFamily,
    pub parameters: ModelParams,
    pub evaluation: EvaluationResult,
    pub features: Vec<String>,
    pub feature_mapping: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// A record together with its id, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub record: ExperimentRecord,
}

/// Backend holding experiment records.
pub trait RecordStore {
    /// Whether any record exists under `experiment_name`.
    fn exists(&self, experiment_name: &str) -> RegistryResult<bool>;

    /// Id for the next record.
    fn allocate_id(&mut self) -> RecordId {
        RecordId::new_v4()
    }

    /// Persist a record under `id`, all or nothing. Fails if
    /// `(experiment_name, configuration_index)` is already taken.
    fn insert(&mut self, id: &RecordId, record: &ExperimentRecord) -> RegistryResult<()>;
}

/// One JSON file per record under `{root}/{experiment_name}/{index:04}.json`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn experiment_dir(&self, experiment_name: &str) -> RegistryResult<PathBuf> {
        if !is_valid_experiment_name(experiment_name) {
            return Err(RegistryError::InvalidName(experiment_name.to_string()));
        }
        Ok(self.root.join(experiment_name))
    }

    /// All records of an experiment, by configuration index.
    pub fn load(&self, experiment_name: &str) -> RegistryResult<Vec<StoredRecord>> {
        let dir = self.experiment_dir(experiment_name)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| RegistryError::io(&dir, e))? {
            let path = entry.map_err(|e| RegistryError::io(&dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let content = fs::read_to_string(&path).map_err(|e| RegistryError::io(&path, e))?;
                records.push(serde_json::from_str::<StoredRecord>(&content)?);
            }
        }
        records.sort_by_key(|r| r.record.configuration_index);
        Ok(records)
    }
}

impl RecordStore for JsonFileStore {
    fn exists(&self, experiment_name: &str) -> RegistryResult<bool> {
        let dir = self.experiment_dir(experiment_name)?;
        if !dir.exists() {
            return Ok(false);
        }
        let mut entries = fs::read_dir(&dir).map_err(|e| RegistryError::io(&dir, e))?;
        Ok(entries.any(|entry| {
            entry
                .map(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                .unwrap_or(false)
        }))
    }

    /// Writes to a temporary file in the experiment directory and renames
    /// it into place without overwriting. A failed write leaves no record.
    fn insert(&mut self, id: &RecordId, record: &ExperimentRecord) -> RegistryResult<()> {
        let dir = self.experiment_dir(&record.experiment_name)?;
        fs::create_dir_all(&dir).map_err(|e| RegistryError::io(&dir, e))?;

        let path = dir.join(format!("{:04}.json", record.configuration_index));
        let duplicate = || RegistryError::DuplicateRecord {
            name: record.experiment_name.clone(),
            index: record.configuration_index,
        };
        if path.exists() {
            return Err(duplicate());
        }

        let stored = StoredRecord {
            id: id.clone(),
            record: record.clone(),
        };
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| RegistryError::io(&dir, e))?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            serde_json::to_writer_pretty(&mut writer, &stored)?;
            writer.flush().map_err(|e| RegistryError::io(&path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| RegistryError::io(&path, e))?;

        tmp.persist_noclobber(&path).map_err(|e| match e.error.kind() {
            ErrorKind::AlreadyExists => duplicate(),
            _ => RegistryError::io(&path, e.error),
        })?;

        debug!("Wrote record {} to {}", id, path.display());
        Ok(())
    }
}

/// Records kept in memory.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Vec<StoredRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[StoredRecord] {
        &self.records
    }
}

impl RecordStore for MemoryRecordStore {
    fn exists(&self, experiment_name: &str) -> RegistryResult<bool> {
        Ok(self
            .records
            .iter()
            .any(|r| r.record.experiment_name == experiment_name))
    }

    fn insert(&mut self, id: &RecordId, record: &ExperimentRecord) -> RegistryResult<()> {
        let taken = self.records.iter().any(|r| {
            r.record.experiment_name == record.experiment_name
                && r.record.configuration_index == record.configuration_index
        });
        if taken {
            return Err(RegistryError::DuplicateRecord {
                name: record.experiment_name.clone(),
                index: record.configuration_index,
            });
        }

        self.records.push(StoredRecord {
            id: id.clone(),
            record: record.clone(),
        });
        Ok(())
    }
}
