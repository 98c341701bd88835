//! # Client Context
//!
//! What client-mode commands need: the codecs, address codecs, chain id and
//! the node endpoint. Resolved without building the application, so no
//! store is ever opened in client mode.

pub mod query;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mini_inject::{Outputs, Provider};
use serde::{Deserialize, Serialize};

use crate::config::{keys, ConfigError, GlobalConfig};
use crate::runtime::codec::{
    AccountAddressCodec, Codec, ConsensusAddressCodec, InterfaceRegistry, LegacyAmino, TxConfig,
    ValidatorAddressCodec,
};
use crate::runtime::module::ModuleManager;

pub use query::{QueryClient, QueryClientError};

/// `<home>/config/client.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfig {
    #[serde(default)]
    pub chain_id: String,
    #[serde(default = "default_keyring_backend")]
    pub keyring_backend: String,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_node")]
    pub node: String,
    #[serde(default = "default_broadcast_mode")]
    pub broadcast_mode: String,
}

fn default_keyring_backend() -> String {
    "test".to_string()
}

fn default_output() -> String {
    "json".to_string()
}

fn default_node() -> String {
    "http://127.0.0.1:1317".to_string()
}

fn default_broadcast_mode() -> String {
    "sync".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            keyring_backend: default_keyring_backend(),
            output: default_output(),
            node: default_node(),
            broadcast_mode: default_broadcast_mode(),
        }
    }
}

impl ClientConfig {
    pub fn path(home: &Path) -> PathBuf {
        home.join("config").join("client.toml")
    }

    /// Read `client.toml`; a missing file yields the defaults.
    pub fn read(home: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path,
            reason: e.to_string(),
        })
    }

    pub fn write(&self, home: &Path) -> Result<(), ConfigError> {
        let path = Self::path(home);
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let write = |path: &Path| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text.as_bytes())
        };
        write(&path).map_err(|source| ConfigError::Write { path, source })
    }
}

/// Context handed to client-mode commands.
#[derive(Clone)]
pub struct ClientContext {
    pub home: PathBuf,
    pub chain_id: String,
    pub node: String,
    pub output: String,
    pub codec: Arc<Codec>,
    pub interface_registry: Arc<InterfaceRegistry>,
    pub tx_config: Arc<TxConfig>,
    pub legacy_amino: Arc<LegacyAmino>,
    pub account_address_codec: Arc<AccountAddressCodec>,
    pub validator_address_codec: Arc<ValidatorAddressCodec>,
    pub consensus_address_codec: Arc<ConsensusAddressCodec>,
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("home", &self.home)
            .field("chain_id", &self.chain_id)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl ClientContext {
    /// HTTP client for the configured node.
    pub fn query_client(&self) -> Result<QueryClient, QueryClientError> {
        QueryClient::new(&self.node)
    }
}

/// Provider of [`ClientContext`].
///
/// A non-empty `chain-id` in `client.toml` wins over the global config.
pub fn client_context_provider() -> Provider {
    Provider::new("client.context")
        .input::<GlobalConfig>()
        .input::<Codec>()
        .input::<InterfaceRegistry>()
        .input::<TxConfig>()
        .input::<LegacyAmino>()
        .input::<AccountAddressCodec>()
        .input::<ValidatorAddressCodec>()
        .input::<ConsensusAddressCodec>()
        .output::<ClientContext>()
        .build(|inputs| {
            let config = inputs.get::<GlobalConfig>()?;
            let home = config.home()?;
            let client = ClientConfig::read(&home)?;
            let chain_id = if client.chain_id.is_empty() {
                config.get_str(keys::CHAIN_ID)?
            } else {
                client.chain_id
            };

            Ok(Outputs::new().with(ClientContext {
                home,
                chain_id,
                node: client.node,
                output: client.output,
                codec: inputs.get::<Codec>()?,
                interface_registry: inputs.get::<InterfaceRegistry>()?,
                tx_config: inputs.get::<TxConfig>()?,
                legacy_amino: inputs.get::<LegacyAmino>()?,
                account_address_codec: inputs.get::<AccountAddressCodec>()?,
                validator_address_codec: inputs.get::<ValidatorAddressCodec>()?,
                consensus_address_codec: inputs.get::<ConsensusAddressCodec>()?,
            }))
        })
}

/// Per-module CLI surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleCliOptions {
    pub query_methods: Vec<String>,
    pub tx_msgs: Vec<String>,
}

/// Commands generated from the module set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoCliOptions {
    pub modules: BTreeMap<String, ModuleCliOptions>,
}

impl AutoCliOptions {
    pub fn from_module_manager(modules: &ModuleManager) -> Self {
        let mut query_methods = modules.query_methods();
        let options = modules
            .modules()
            .iter()
            .map(|module| {
                let name = module.name().to_string();
                let cli = ModuleCliOptions {
                    query_methods: query_methods.remove(&name).unwrap_or_default(),
                    tx_msgs: module.msg_type_urls(),
                };
                (name, cli)
            })
            .collect();
        Self { modules: options }
    }

    pub fn module(&self, name: &str) -> Option<&ModuleCliOptions> {
        self.modules.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ClientConfig::read(dir.path()).unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_client_config_written_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            chain_id: "mini-test".to_string(),
            ..ClientConfig::default()
        };
        config.write(dir.path()).unwrap();
        let text = std::fs::read_to_string(ClientConfig::path(dir.path())).unwrap();
        assert!(text.contains("chain-id = \"mini-test\""));
        assert_eq!(ClientConfig::read(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_client_config_write_failure_is_reported_as_write() {
        // A file where the config directory should be
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config"), "not a directory").unwrap();

        let err = ClientConfig::default().write(dir.path()).unwrap_err();

        assert!(matches!(err, ConfigError::Write { .. }), "{err}");
    }

    #[test]
    fn test_partial_client_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = ClientConfig::path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "node = \"http://10.0.0.1:1317\"\n").unwrap();
        let config = ClientConfig::read(dir.path()).unwrap();
        assert_eq!(config.node, "http://10.0.0.1:1317");
        assert_eq!(config.output, "json");
    }
}
