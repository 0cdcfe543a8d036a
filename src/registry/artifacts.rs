//! Run artifacts: prediction tables, fitted-state snapshots and dataset dumps.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::debug;

use super::{RegistryError, RegistryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Predictions,
    Model,
    Imputer,
    Scaler,
    Dump,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Predictions,
        ArtifactKind::Model,
        ArtifactKind::Imputer,
        ArtifactKind::Scaler,
        ArtifactKind::Dump,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Predictions => "predictions",
            ArtifactKind::Model => "models",
            ArtifactKind::Imputer => "imputers",
            ArtifactKind::Scaler => "scalers",
            ArtifactKind::Dump => "dumps",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Directory layout under the output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.root.join("registry")
    }

    /// Create every output directory. Safe to call repeatedly.
    pub fn ensure(&self) -> RegistryResult<()> {
        let dirs = ArtifactKind::ALL
            .iter()
            .map(|kind| self.dir(*kind))
            .chain(std::iter::once(self.registry_dir()));
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|e| RegistryError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Destination for artifact files.
pub trait ArtifactSink {
    fn write_csv(
        &mut self,
        kind: ArtifactKind,
        file_name: &str,
        df: &mut DataFrame,
    ) -> RegistryResult<()>;

    fn write_binary(
        &mut self,
        kind: ArtifactKind,
        file_name: &str,
        bytes: &[u8],
    ) -> RegistryResult<()>;
}

/// Writes artifacts into an [`OutputLayout`].
pub struct FsArtifactSink {
    layout: OutputLayout,
}

impl FsArtifactSink {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    fn path(&self, kind: ArtifactKind, file_name: &str) -> RegistryResult<PathBuf> {
        let dir = self.layout.dir(kind);
        fs::create_dir_all(&dir).map_err(|e| RegistryError::io(&dir, e))?;
        Ok(dir.join(file_name))
    }
}

impl ArtifactSink for FsArtifactSink {
    fn write_csv(
        &mut self,
        kind: ArtifactKind,
        file_name: &str,
        df: &mut DataFrame,
    ) -> RegistryResult<()> {
        let path = self.path(kind, file_name)?;
        let file = fs::File::create(&path).map_err(|e| RegistryError::io(&path, e))?;
        CsvWriter::new(file).include_header(true).finish(df)?;
        debug!("Wrote {} rows to {}", df.height(), path.display());
        Ok(())
    }

    fn write_binary(
        &mut self,
        kind: ArtifactKind,
        file_name: &str,
        bytes: &[u8],
    ) -> RegistryResult<()> {
        let path = self.path(kind, file_name)?;
        fs::write(&path, bytes).map_err(|e| RegistryError::io(&path, e))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// Keeps artifacts in memory, keyed by kind and file name.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    files: BTreeMap<(ArtifactKind, String), Vec<u8>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ArtifactKind, file_name: &str) -> Option<&[u8]> {
        self.files
            .get(&(kind, file_name.to_string()))
            .map(|bytes| bytes.as_slice())
    }

    pub fn count(&self, kind: ArtifactKind) -> usize {
        self.files.keys().filter(|(k, _)| *k == kind).count()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ArtifactSink for MemoryArtifactSink {
    fn write_csv(
        &mut self,
        kind: ArtifactKind,
        file_name: &str,
        df: &mut DataFrame,
    ) -> RegistryResult<()> {
        let mut buffer = Vec::new();
        CsvWriter::new(&mut buffer).include_header(true).finish(df)?;
        self.files.insert((kind, file_name.to_string()), buffer);
        Ok(())
    }

    fn write_binary(
        &mut self,
        kind: ArtifactKind,
        file_name: &str,
        bytes: &[u8],
    ) -> RegistryResult<()> {
        self.files
            .insert((kind, file_name.to_string()), bytes.to_vec());
        Ok(())
    }
}
