//! Crash-safe persistence of worker records
//!
//! State is a JSON envelope `{"last_bestever": {"<worker>": <best>}}`.
//! Saves write the full document to `<state>.tmp` next to the canonical
//! file and rename it into place, so a reader only ever sees the previous
//! or the new document.

use crate::extract;
use crate::tracker::Records;
use serde::Serialize;
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Envelope key holding the records map
const RECORDS_KEY: &str = "last_bestever";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct PersistedState<'a> {
    last_bestever: &'a Records,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path the next save is staged at
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("state"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Create the directory holding the state file
    pub async fn ensure_parent_dir(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).await.map_err(|e| StoreError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })
            }
            _ => Ok(()),
        }
    }

    /// Load records. A missing, unreadable or malformed file yields an
    /// empty map; entries without a usable value are dropped.
    pub async fn load(&self) -> Records {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet");
                return Records::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "State file unreadable, starting fresh");
                return Records::new();
            }
        };

        let value: Value = match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "State file malformed, starting fresh");
                return Records::new();
            }
        };

        let Some(Value::Object(entries)) = value.get(RECORDS_KEY) else {
            return Records::new();
        };

        entries
            .iter()
            .filter(|(name, _)| !name.trim().is_empty())
            .filter_map(|(name, best)| extract::as_u64(best).map(|best| (name.clone(), best)))
            .collect()
    }

    /// Atomically replace the state file with `records`
    pub async fn save(&self, records: &Records) -> Result<(), StoreError> {
        let contents = serde_json::to_vec(&PersistedState {
            last_bestever: records,
        })?;
        let temp_path = self.temp_path();
        let io_err = |source| StoreError::Io {
            path: temp_path.clone(),
            source,
        };

        {
            let mut temp_file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .await
                .map_err(io_err)?;
            temp_file.write_all(&contents).await.map_err(io_err)?;
            temp_file.flush().await.map_err(io_err)?;
            temp_file.sync_all().await.map_err(io_err)?;
        }

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: e,
            })?;

        debug!(path = %self.path.display(), workers = records.len(), "State saved");
        Ok(())
    }
}
