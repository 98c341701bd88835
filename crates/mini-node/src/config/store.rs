//! Root store configuration.
//!
//! The commitment layer's minimum retained version count is always derived
//! from the pruning keep-recent setting. It is not independently
//! configurable; any value found in the config under that name is ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{keys, ConfigError, GlobalConfig};

/// Versions removed by one pruning pass unless configured otherwise.
pub const DEFAULT_PRUNE_LIMIT: u64 = 1;

/// Pruning of old store versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruningOption {
    /// Versions kept in addition to the latest; 0 disables pruning
    pub keep_recent: u64,
    /// Prune every `interval` commits; 0 disables pruning
    pub interval: u64,
}

impl PruningOption {
    pub fn is_enabled(&self) -> bool {
        self.keep_recent > 0 && self.interval > 0
    }
}

/// Commitment tree options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IavlConfig {
    pub minimum_keep_versions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    pub sc_pruning: PruningOption,
    pub iavl: IavlConfig,
    /// Maximum versions removed by one pruning pass; 0 is unbounded
    pub prune_limit: u64,
}

/// Configuration handed to the store builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootStoreConfig {
    pub home: PathBuf,
    pub backend: String,
    pub options: StoreOptions,
}

impl RootStoreConfig {
    /// Derive the store config from the global config.
    pub fn from_global(config: &GlobalConfig) -> Result<Self, ConfigError> {
        let sc_pruning = PruningOption {
            keep_recent: config.get_u64(keys::SC_KEEP_RECENT)?,
            interval: config.get_u64(keys::SC_INTERVAL)?,
        };
        let prune_limit = if config.contains(keys::PRUNE_LIMIT) {
            config.get_u64(keys::PRUNE_LIMIT)?
        } else {
            DEFAULT_PRUNE_LIMIT
        };
        Ok(Self::new(
            config.home()?,
            config.get_str(keys::APP_DB_BACKEND)?,
            sc_pruning,
        )
        .with_prune_limit(prune_limit))
    }

    pub fn new(home: PathBuf, backend: impl Into<String>, sc_pruning: PruningOption) -> Self {
        Self {
            home,
            backend: backend.into(),
            options: StoreOptions {
                sc_pruning,
                iavl: IavlConfig {
                    minimum_keep_versions: sc_pruning.keep_recent,
                },
                prune_limit: DEFAULT_PRUNE_LIMIT,
            },
        }
    }

    pub fn with_prune_limit(mut self, prune_limit: u64) -> Self {
        self.options.prune_limit = prune_limit;
        self
    }

    pub fn data_dir(&self) -> PathBuf {
        self.home.join("data")
    }
}

/// Provider body for [`RootStoreConfig`].
pub fn provide_root_store_config(config: &GlobalConfig) -> anyhow::Result<RootStoreConfig> {
    Ok(RootStoreConfig::from_global(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn global(keep_recent: u64) -> GlobalConfig {
        GlobalConfig::from_pairs([
            (keys::HOME, Value::from("/tmp/mini")),
            (keys::APP_DB_BACKEND, Value::from("memdb")),
            (keys::SC_KEEP_RECENT, Value::from(keep_recent)),
            (keys::SC_INTERVAL, Value::from(10u64)),
        ])
    }

    #[test]
    fn test_keep_versions_follow_keep_recent() {
        let config = provide_root_store_config(&global(100)).unwrap();
        assert_eq!(config.options.iavl.minimum_keep_versions, 100);

        let config = provide_root_store_config(&global(0)).unwrap();
        assert_eq!(config.options.iavl.minimum_keep_versions, 0);
        assert!(!config.options.sc_pruning.is_enabled());
    }

    #[test]
    fn test_keep_recent_from_string_value() {
        let mut pairs = global(1).values().clone();
        pairs.insert(keys::SC_KEEP_RECENT.to_string(), Value::from("42"));
        let config = RootStoreConfig::from_global(&GlobalConfig::from_pairs(pairs)).unwrap();
        assert_eq!(config.options.iavl.minimum_keep_versions, 42);
    }

    #[test]
    fn test_prune_limit_defaults_to_one() {
        let config = RootStoreConfig::from_global(&global(2)).unwrap();
        assert_eq!(config.options.prune_limit, 1);

        let mut pairs = global(2).values().clone();
        pairs.insert(keys::PRUNE_LIMIT.to_string(), Value::from(0u64));
        let config = RootStoreConfig::from_global(&GlobalConfig::from_pairs(pairs)).unwrap();
        assert_eq!(config.options.prune_limit, 0);
    }

    #[test]
    fn test_data_dir_under_home() {
        let config = RootStoreConfig::from_global(&global(2)).unwrap();
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/mini/data"));
    }
}
