//! Durable model snapshots.
//!
//! Each trained model is written as a JSON envelope carrying a schema version
//! and a kind tag. Writes go through a temporary file in the target directory
//! which is renamed over the previous snapshot.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Snapshot schema understood by this build
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot not found: {0}")]
    NotFound(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot {path}: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported snapshot schema version {found} (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },

    #[error("snapshot kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: String, found: String },
}

impl PersistenceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Writes `bytes` to a temporary file next to `path` and renames it into place.
///
/// Readers see either the previous file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PersistenceError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| PersistenceError::io(path, e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "File written");
    Ok(())
}

/// Versioned wrapper written around every model payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub schema_version: u32,
    pub kind: String,
    pub saved_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> Snapshot<T> {
    pub fn new(kind: impl Into<String>, payload: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            kind: kind.into(),
            saved_at: Utc::now(),
            payload,
        }
    }
}

/// A single snapshot file on disk
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    kind: &'static str,
}

impl SnapshotStore {
    pub fn new(dir: impl AsRef<Path>, file_name: &str, kind: &'static str) -> Self {
        Self {
            path: dir.as_ref().join(file_name),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Serializes `payload` and atomically replaces the snapshot file.
    pub fn save<'a, T: Serialize>(
        &self,
        payload: &'a T,
    ) -> Result<Snapshot<&'a T>, PersistenceError> {
        let snapshot = Snapshot::new(self.kind, payload);
        let bytes = serde_json::to_vec(&snapshot).map_err(|e| PersistenceError::Format {
            path: self.path.display().to_string(),
            source: e,
        })?;
        write_atomic(&self.path, &bytes)?;

        info!(
            kind = self.kind,
            path = %self.path.display(),
            bytes = bytes.len(),
            "Snapshot saved"
        );
        Ok(snapshot)
    }

    /// Reads the snapshot, rejecting unknown schema versions and foreign kinds.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Snapshot<T>, PersistenceError> {
        if !self.exists() {
            return Err(PersistenceError::NotFound(self.path.display().to_string()));
        }

        let bytes = fs::read(&self.path).map_err(|e| PersistenceError::io(&self.path, e))?;

        // Check the header before decoding the payload so version errors are reported as such
        let header: Snapshot<serde::de::IgnoredAny> =
            serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Format {
                path: self.path.display().to_string(),
                source: e,
            })?;
        if header.schema_version != SCHEMA_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                expected: SCHEMA_VERSION,
                found: header.schema_version,
            });
        }
        if header.kind != self.kind {
            return Err(PersistenceError::KindMismatch {
                expected: self.kind.to_string(),
                found: header.kind,
            });
        }

        let snapshot: Snapshot<T> =
            serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Format {
                path: self.path.display().to_string(),
                source: e,
            })?;
        debug!(kind = self.kind, saved_at = %snapshot.saved_at, "Snapshot loaded");
        Ok(snapshot)
    }
}
