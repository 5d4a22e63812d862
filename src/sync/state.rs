//! Sidecar record persisted per watch root.
//!
//! One small toml file in the configured conf directory remembers
//! whether the initial bulk upload has completed, so a restart does
//! not re-walk the whole tree into the store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::error::BoxError;
use crate::sync::error::{Result, SyncError};

const STATE_FILE: &str = "state.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncState {
    /// Whether the initial bulk scan of the watch root has completed.
    pub file_initialized: bool,
}

impl SyncState {
    pub fn path_in(conf_dir: &Path) -> PathBuf {
        conf_dir.join(STATE_FILE)
    }

    /// Read the record, treating a missing file as the default state.
    pub fn load(conf_dir: &Path) -> Result<Self> {
        let path = Self::path_in(conf_dir);
        match std::fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw).map_err(|err| SyncError::State {
                path,
                source: err.into(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(SyncError::State {
                path,
                source: err.into(),
            }),
        }
    }

    pub fn store(&self, conf_dir: &Path) -> Result<()> {
        let path = Self::path_in(conf_dir);
        let state_err = |source: BoxError| SyncError::State {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(conf_dir).map_err(|e| state_err(e.into()))?;
        let raw = toml::to_string(self).map_err(|e| state_err(e.into()))?;
        std::fs::write(&path, raw).map_err(|e| state_err(e.into()))?;
        Ok(())
    }
}
