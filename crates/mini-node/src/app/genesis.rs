//! # Genesis Document
//!
//! `<home>/config/genesis.json`: chain id, genesis time and the per-module
//! app state committed as version 1 on first start.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::module::{GenesisState, ModuleError, ModuleManager};

/// Genesis document errors.
#[derive(Debug, Error)]
pub enum GenesisError {
    /// Genesis file could not be read or written.
    #[error("genesis file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Genesis file is not valid JSON for a genesis document.
    #[error("failed to parse genesis file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Invalid genesis configuration.
    #[error("Invalid genesis configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Module(#[from] ModuleError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    pub genesis_time: DateTime<Utc>,
    pub initial_height: u64,
    pub app_state: GenesisState,
}

impl GenesisDoc {
    pub fn new(chain_id: impl Into<String>, app_state: GenesisState) -> Self {
        Self {
            chain_id: chain_id.into(),
            genesis_time: Utc::now(),
            initial_height: 1,
            app_state,
        }
    }

    pub fn read(path: &Path) -> Result<Self, GenesisError> {
        let bytes = std::fs::read(path).map_err(|source| GenesisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| GenesisError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), GenesisError> {
        let io = |source| GenesisError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| GenesisError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(|source| GenesisError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate the document and every module's app state.
    pub fn validate(&self, modules: &ModuleManager) -> Result<(), GenesisError> {
        if self.chain_id.trim().is_empty() {
            return Err(GenesisError::InvalidConfig("chain id is empty".to_string()));
        }
        if self.initial_height == 0 {
            return Err(GenesisError::InvalidConfig(
                "initial height must be at least 1".to_string(),
            ));
        }
        modules.validate_genesis(&self.app_state)?;
        Ok(())
    }
}

pub fn genesis_path(home: &Path) -> PathBuf {
    home.join("config").join("genesis.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = genesis_path(dir.path());
        let doc = GenesisDoc::new("mini-test", GenesisState::new());
        doc.write(&path).unwrap();
        assert_eq!(GenesisDoc::read(&path).unwrap(), doc);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GenesisDoc::read(&genesis_path(dir.path())),
            Err(GenesisError::Io { .. })
        ));
    }
}
