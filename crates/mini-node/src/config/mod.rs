//! # Configuration Overlay
//!
//! Configuration is assembled from ordered, named layers and flattened into a
//! single immutable [`GlobalConfig`] before resolution:
//!
//! ```text
//!   defaults ──► app.toml ──► env (MINI_*) ──► flags
//!   (lowest)                                  (highest)
//! ```
//!
//! Keys are dotted paths (`store.options.sc-pruning-option.keep-recent`).
//! The last layer to define a key wins. Unknown keys pass through untouched
//! so components can read options this crate does not know about.
//!
//! The flattened config is handed to the resolver as a supplied value and
//! passed by reference from there; there is no process-wide config state.

pub mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use store::{provide_root_store_config, IavlConfig, PruningOption, RootStoreConfig, StoreOptions};

/// Prefix of every environment variable the node reads.
pub const ENV_PREFIX: &str = "MINI";

/// Recognized configuration keys.
pub mod keys {
    pub const HOME: &str = "home";
    pub const CHAIN_ID: &str = "chain-id";
    pub const MINIMUM_GAS_PRICES: &str = "minimum-gas-prices";
    pub const LOG_LEVEL: &str = "log_level";
    pub const LOG_FORMAT: &str = "log_format";

    pub const COMET_TIMEOUT_COMMIT: &str = "comet.consensus.timeout_commit";
    pub const COMET_LOG_LEVEL: &str = "comet.log_level";
    pub const COMET_DB_BACKEND: &str = "comet.db_backend";
    pub const COMET_MONIKER: &str = "comet.moniker";

    pub const APP_DB_BACKEND: &str = "store.app-db-backend";
    pub const SC_KEEP_RECENT: &str = "store.options.sc-pruning-option.keep-recent";
    pub const SC_INTERVAL: &str = "store.options.sc-pruning-option.interval";
    pub const PRUNE_LIMIT: &str = "store.options.prune-limit";

    pub const GRPC_ADDRESS: &str = "grpc.address";
    pub const GATEWAY_ADDRESS: &str = "grpc-gateway.address";
    pub const REST_ADDRESS: &str = "rest.address";
    pub const SHUTDOWN_TIMEOUT: &str = "shutdown.timeout";
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration key {key}")]
    Missing { key: String },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// One named fragment of the overlay.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    name: String,
    values: BTreeMap<String, Value>,
}

impl ConfigLayer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

/// Ordered set of configuration layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverlay {
    layers: Vec<ConfigLayer>,
}

impl ConfigOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay holding only the default layer.
    pub fn with_defaults(home: &Path) -> Self {
        let mut overlay = Self::new();
        overlay.push_layer("defaults", default_values(home));
        overlay
    }

    /// Append a layer; it overrides every layer pushed before it.
    pub fn push_layer(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = (String, Value)>,
    ) -> &mut Self {
        let layer = ConfigLayer {
            name: name.into(),
            values: values.into_iter().collect(),
        };
        debug!(layer = %layer.name, keys = layer.values.len(), "config layer added");
        self.layers.push(layer);
        self
    }

    /// Append `<home>/config/app.toml` as a layer, if the file exists.
    pub fn load_app_toml(&mut self, home: &Path) -> Result<&mut Self, ConfigError> {
        let path = app_toml_path(home);
        if !path.exists() {
            return Ok(self);
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let values = parse_toml(&text).map_err(|reason| ConfigError::Parse {
            path: path.clone(),
            reason,
        })?;
        Ok(self.push_layer("app.toml", values))
    }

    /// Append a layer from `MINI_*` variables for every key known so far.
    pub fn load_env(&mut self) -> &mut Self {
        self.load_env_from(std::env::vars())
    }

    /// Same as [`Self::load_env`] over an explicit variable list.
    pub fn load_env_from(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> &mut Self {
        let by_env: BTreeMap<String, String> = self
            .known_keys()
            .into_iter()
            .map(|key| (env_var_name(&key), key))
            .collect();

        let values: Vec<(String, Value)> = vars
            .into_iter()
            .filter_map(|(name, value)| {
                by_env
                    .get(&name)
                    .map(|key| (key.clone(), Value::String(value)))
            })
            .collect();
        self.push_layer("env", values)
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    fn known_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .layers
            .iter()
            .flat_map(|l| l.values.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Merge the layers, last writer wins per key.
    pub fn flatten(&self) -> GlobalConfig {
        let mut values = BTreeMap::new();
        for layer in &self.layers {
            for (key, value) in &layer.values {
                values.insert(key.clone(), value.clone());
            }
        }
        GlobalConfig { values }
    }
}

/// Environment variable for a config key: `MINI_` + key with `.`/`-` as `_`.
pub fn env_var_name(key: &str) -> String {
    let suffix: String = key
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{ENV_PREFIX}_{suffix}")
}

pub fn app_toml_path(home: &Path) -> PathBuf {
    home.join("config").join("app.toml")
}

/// Default home directory: `~/.minid`.
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".minid")
}

fn default_values(home: &Path) -> BTreeMap<String, Value> {
    let pairs: [(&str, Value); 17] = [
        (keys::HOME, Value::from(home.display().to_string())),
        (keys::CHAIN_ID, Value::from("mini-1")),
        (keys::MINIMUM_GAS_PRICES, Value::from("0mini")),
        (keys::LOG_LEVEL, Value::from("info")),
        (keys::LOG_FORMAT, Value::from("plain")),
        (keys::COMET_TIMEOUT_COMMIT, Value::from("3s")),
        (keys::COMET_LOG_LEVEL, Value::from("*:error,p2p:info,state:info")),
        (keys::COMET_DB_BACKEND, Value::from("goleveldb")),
        (keys::COMET_MONIKER, Value::from("mini-node")),
        (keys::APP_DB_BACKEND, Value::from("filedb")),
        (keys::SC_KEEP_RECENT, Value::from(2u64)),
        (keys::SC_INTERVAL, Value::from(100u64)),
        (keys::PRUNE_LIMIT, Value::from(store::DEFAULT_PRUNE_LIMIT)),
        (keys::GRPC_ADDRESS, Value::from("127.0.0.1:9090")),
        (keys::GATEWAY_ADDRESS, Value::from("127.0.0.1:1317")),
        (keys::REST_ADDRESS, Value::from("127.0.0.1:8080")),
        (keys::SHUTDOWN_TIMEOUT, Value::from("10s")),
    ];
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Flatten a TOML document into dotted keys.
fn parse_toml(text: &str) -> Result<BTreeMap<String, Value>, String> {
    let table: toml::Table = text.parse().map_err(|e: toml::de::Error| e.to_string())?;
    let mut out = BTreeMap::new();
    flatten_toml("", &toml::Value::Table(table), &mut out)?;
    Ok(out)
}

fn flatten_toml(
    prefix: &str,
    value: &toml::Value,
    out: &mut BTreeMap<String, Value>,
) -> Result<(), String> {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_toml(&path, child, out)?;
            }
        }
        other => {
            let json = serde_json::to_value(other).map_err(|e| e.to_string())?;
            out.insert(prefix.to_string(), json);
        }
    }
    Ok(())
}

/// Render dotted keys back into a nested TOML document.
pub fn render_toml(values: &BTreeMap<String, Value>) -> Result<String, ConfigError> {
    let mut root = toml::Table::new();
    for (key, value) in values {
        let invalid = |reason: String| ConfigError::Invalid {
            key: key.clone(),
            reason,
        };
        let leaf: toml::Value =
            serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))?;
        let mut parts: Vec<&str> = key.split('.').collect();
        let last = parts.pop().unwrap_or(key.as_str());

        let mut table = &mut root;
        for part in parts {
            let entry = table
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            table = match entry {
                toml::Value::Table(t) => t,
                _ => return Err(invalid(format!("{part} is both a value and a table"))),
            };
        }
        table.insert(last.to_string(), leaf);
    }
    toml::to_string_pretty(&root).map_err(|e| ConfigError::Invalid {
        key: "<document>".to_string(),
        reason: e.to_string(),
    })
}

/// Flattened, immutable configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfig {
    values: BTreeMap<String, Value>,
}

impl GlobalConfig {
    /// Build directly from key/value pairs.
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    fn require(&self, key: &str) -> Result<&Value, ConfigError> {
        self.values.get(key).ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }

    fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// String value; numbers and booleans are rendered.
    pub fn get_str(&self, key: &str) -> Result<String, ConfigError> {
        match self.require(key)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(Self::invalid(key, format!("expected a string, got {other}"))),
        }
    }

    /// Unsigned integer, native or as a decimal string.
    pub fn get_u64(&self, key: &str) -> Result<u64, ConfigError> {
        match self.require(key)? {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| Self::invalid(key, format!("{n} is not an unsigned integer"))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|e| Self::invalid(key, format!("{s:?}: {e}"))),
            other => Err(Self::invalid(key, format!("expected an integer, got {other}"))),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        match self.require(key)? {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(Self::invalid(key, format!("{s:?} is not a boolean"))),
            },
            other => Err(Self::invalid(key, format!("expected a boolean, got {other}"))),
        }
    }

    /// Duration in `humantime` syntax (`3s`, `250ms`); bare integers are seconds.
    pub fn get_duration(&self, key: &str) -> Result<Duration, ConfigError> {
        match self.require(key)? {
            Value::Number(n) => n
                .as_u64()
                .map(Duration::from_secs)
                .ok_or_else(|| Self::invalid(key, format!("{n} is not a whole number of seconds"))),
            Value::String(s) => humantime::parse_duration(s.trim())
                .map_err(|e| Self::invalid(key, format!("{s:?}: {e}"))),
            other => Err(Self::invalid(key, format!("expected a duration, got {other}"))),
        }
    }

    pub fn home(&self) -> Result<PathBuf, ConfigError> {
        self.get_str(keys::HOME).map(PathBuf::from)
    }

    /// Keys under `prefix.`, with the prefix stripped.
    pub fn section(&self, prefix: &str) -> BTreeMap<String, Value> {
        let dotted = format!("{prefix}.");
        self.values
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&dotted).map(|rest| (rest.to_string(), v.clone())))
            .collect()
    }
}

/// Assemble the process configuration.
///
/// `home` is taken from the flags, then `MINI_HOME`, then `~/.minid`, and is
/// always present in the result.
pub fn load(flags: BTreeMap<String, Value>) -> Result<GlobalConfig, ConfigError> {
    let home = match flags.get(keys::HOME).and_then(Value::as_str) {
        Some(home) => PathBuf::from(home),
        None => std::env::var(env_var_name(keys::HOME))
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home()),
    };

    let mut overlay = ConfigOverlay::with_defaults(&home);
    overlay.load_app_toml(&home)?;
    overlay.load_env();
    overlay.push_layer("flags", flags);

    let mut config = overlay.flatten();
    config
        .values
        .insert(keys::HOME.to_string(), Value::from(home.display().to_string()));
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_layer_wins() {
        let mut overlay = ConfigOverlay::new();
        overlay
            .push_layer("a", [("x".to_string(), Value::from(1)), ("y".to_string(), Value::from(1))])
            .push_layer("b", [("x".to_string(), Value::from(2))]);

        let config = overlay.flatten();
        assert_eq!(config.get_u64("x").unwrap(), 2);
        assert_eq!(config.get_u64("y").unwrap(), 1);
        assert_eq!(overlay.layer_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_defaults_carry_node_overrides() {
        let config = ConfigOverlay::with_defaults(Path::new("/tmp/mini")).flatten();
        assert_eq!(config.get_str(keys::MINIMUM_GAS_PRICES).unwrap(), "0mini");
        assert_eq!(
            config.get_duration(keys::COMET_TIMEOUT_COMMIT).unwrap(),
            Duration::from_secs(3)
        );
        assert_eq!(config.get_str(keys::COMET_DB_BACKEND).unwrap(), "goleveldb");
        assert_eq!(config.home().unwrap(), PathBuf::from("/tmp/mini"));
    }

    #[test]
    fn test_env_layer_overrides_known_keys_only() {
        let mut overlay = ConfigOverlay::with_defaults(Path::new("/tmp/mini"));
        overlay.load_env_from([
            ("MINI_STORE_OPTIONS_SC_PRUNING_OPTION_KEEP_RECENT".to_string(), "7".to_string()),
            ("MINI_NOT_A_KEY".to_string(), "x".to_string()),
        ]);

        let config = overlay.flatten();
        assert_eq!(config.get_u64(keys::SC_KEEP_RECENT).unwrap(), 7);
        assert!(!config.contains("not.a.key"));
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("grpc-gateway.address"), "MINI_GRPC_GATEWAY_ADDRESS");
        assert_eq!(env_var_name("home"), "MINI_HOME");
    }

    #[test]
    fn test_app_toml_flattens_and_passes_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(
            app_toml_path(dir.path()),
            "minimum-gas-prices = \"5mini\"\n[store.options.sc-pruning-option]\nkeep-recent = 100\n[custom]\nflag = true\n",
        )
        .unwrap();

        let mut overlay = ConfigOverlay::with_defaults(dir.path());
        overlay.load_app_toml(dir.path()).unwrap();
        let config = overlay.flatten();

        assert_eq!(config.get_str(keys::MINIMUM_GAS_PRICES).unwrap(), "5mini");
        assert_eq!(config.get_u64(keys::SC_KEEP_RECENT).unwrap(), 100);
        assert!(config.get_bool("custom.flag").unwrap());
        assert_eq!(config.section("custom").len(), 1);
    }

    #[test]
    fn test_render_toml_round_trips_defaults() {
        let defaults = default_values(Path::new("/tmp/mini"));
        let text = render_toml(&defaults).unwrap();
        assert_eq!(parse_toml(&text).unwrap(), defaults);
    }

    #[test]
    fn test_typed_getters_reject_bad_values() {
        let config = GlobalConfig::from_pairs([
            ("n", Value::from("abc")),
            ("d", Value::from("soon")),
        ]);
        assert!(matches!(config.get_u64("n"), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config.get_duration("d"), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config.get_str("missing"), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_load_applies_flags_last() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().display().to_string();
        let flags = BTreeMap::from([
            (keys::HOME.to_string(), Value::from(home.clone())),
            (keys::MINIMUM_GAS_PRICES.to_string(), Value::from("9mini")),
        ]);

        let config = load(flags).unwrap();
        assert_eq!(config.get_str(keys::HOME).unwrap(), home);
        assert_eq!(config.get_str(keys::MINIMUM_GAS_PRICES).unwrap(), "9mini");
    }
}
