//! Application modules and the module manager.
//!
//! Modules are declared in `app.yaml`. Ledger logic is out of scope for the
//! node core, so every module is a [`StateModule`]: a named JSON state blob
//! with params, its own message types and two query methods.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::codec::{CodecError, InterfaceRegistry, LegacyAmino, MSG_INTERFACE};

/// Module that must always be present.
pub const RUNTIME_MODULE: &str = "runtime";

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("invalid app config: {0}")]
    InvalidConfig(String),

    #[error("unknown module {0}")]
    UnknownModule(String),

    #[error("invalid genesis for module {module}: {reason}")]
    InvalidGenesis { module: String, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One entry of `app.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

/// Parsed `app.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppModulesConfig {
    pub modules: Vec<ModuleEntry>,
}

impl AppModulesConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ModuleError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| ModuleError::InvalidConfig(e.to_string()))?;
        if !config.modules.iter().any(|m| m.name == RUNTIME_MODULE) {
            return Err(ModuleError::InvalidConfig(format!(
                "missing {RUNTIME_MODULE} module"
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for module in &config.modules {
            if !seen.insert(module.name.as_str()) {
                return Err(ModuleError::InvalidConfig(format!(
                    "module {} declared twice",
                    module.name
                )));
            }
        }
        Ok(config)
    }

    pub fn entry(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Deserialize the config block of module `name`.
    pub fn module_config<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<T, ModuleError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        serde_yaml::from_value(entry.config.clone())
            .map_err(|e| ModuleError::InvalidConfig(format!("{name}: {e}")))
    }
}

/// Config of the `runtime` module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeModuleConfig {
    pub app_name: String,
    #[serde(default)]
    pub begin_blockers: Vec<String>,
    #[serde(default)]
    pub end_blockers: Vec<String>,
    #[serde(default)]
    pub init_genesis: Vec<String>,
}

/// Config of the `auth` module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthModuleConfig {
    pub bech32_prefix: String,
}

/// Config of the `staking` module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingModuleConfig {
    pub bech32_prefix_validator: String,
    pub bech32_prefix_consensus: String,
}

/// A ledger module as seen by the node core.
pub trait AppModule: Send + Sync {
    fn name(&self) -> &str;

    fn default_genesis(&self) -> Value;

    fn validate_genesis(&self, state: &Value) -> Result<(), ModuleError>;

    /// Type URLs of the messages this module handles.
    fn msg_type_urls(&self) -> Vec<String>;

    fn register_interfaces(&self, registry: &InterfaceRegistry) -> Result<(), CodecError> {
        for type_url in self.msg_type_urls() {
            registry.register_implementation(MSG_INTERFACE, &type_url)?;
        }
        Ok(())
    }

    fn register_legacy_amino(&self, amino: &LegacyAmino) {
        for type_url in self.msg_type_urls() {
            let short = type_url.rsplit('.').next().unwrap_or(&type_url).to_string();
            amino.register_concrete(&type_url, &format!("mini/{}/{short}", self.name()));
        }
    }
}

/// Generic module backed by a JSON state blob.
#[derive(Debug, Clone)]
pub struct StateModule {
    name: String,
    params: Value,
}

impl StateModule {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl AppModule for StateModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_genesis(&self) -> Value {
        json!({ "params": self.params })
    }

    fn validate_genesis(&self, state: &Value) -> Result<(), ModuleError> {
        let invalid = |reason: &str| ModuleError::InvalidGenesis {
            module: self.name.clone(),
            reason: reason.to_string(),
        };
        let object = state.as_object().ok_or_else(|| invalid("state must be an object"))?;
        if !object.contains_key("params") {
            return Err(invalid("missing params"));
        }
        Ok(())
    }

    fn msg_type_urls(&self) -> Vec<String> {
        let mut urls = vec![format!("/mini.{}.v1.MsgUpdateParams", self.name)];
        if self.name == "bank" {
            urls.push("/mini.bank.v1.MsgSend".to_string());
        }
        urls
    }
}

/// Genesis app state: module name to module state.
pub type GenesisState = BTreeMap<String, Value>;

/// Store key of a module's state.
pub fn state_key(module: &str) -> String {
    format!("{module}/state")
}

/// Owns the module set and the block/genesis ordering.
pub struct ModuleManager {
    modules: Vec<Arc<dyn AppModule>>,
    order: RuntimeModuleConfig,
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("modules", &self.module_names())
            .field("order", &self.order)
            .finish()
    }
}

impl ModuleManager {
    /// Build from `app.yaml`. Every declared module except `runtime` becomes a
    /// [`StateModule`] whose params are its config block.
    pub fn from_config(
        config: &AppModulesConfig,
        runtime: &RuntimeModuleConfig,
    ) -> Result<Self, ModuleError> {
        let modules: Vec<Arc<dyn AppModule>> = config
            .modules
            .iter()
            .filter(|m| m.name != RUNTIME_MODULE)
            .map(|m| {
                let params = serde_json::to_value(&m.config)
                    .map_err(|e| ModuleError::InvalidConfig(format!("{}: {e}", m.name)))?;
                let params = if params.is_null() { json!({}) } else { params };
                Ok(Arc::new(StateModule::new(m.name.clone(), params)) as Arc<dyn AppModule>)
            })
            .collect::<Result<_, ModuleError>>()?;
        Self::new(modules, runtime.clone())
    }

    pub fn new(modules: Vec<Arc<dyn AppModule>>, order: RuntimeModuleConfig) -> Result<Self, ModuleError> {
        let manager = Self { modules, order };
        let ordered = manager
            .order
            .begin_blockers
            .iter()
            .chain(&manager.order.end_blockers)
            .chain(&manager.order.init_genesis);
        for name in ordered {
            if manager.get(name).is_none() {
                return Err(ModuleError::UnknownModule(name.clone()));
            }
        }
        Ok(manager)
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AppModule>> {
        self.modules.iter().find(|m| m.name() == name)
    }

    pub fn modules(&self) -> &[Arc<dyn AppModule>] {
        &self.modules
    }

    /// Modules in genesis order: `init_genesis` first, then the rest.
    pub fn genesis_order(&self) -> Vec<&Arc<dyn AppModule>> {
        let mut ordered: Vec<&Arc<dyn AppModule>> = self
            .order
            .init_genesis
            .iter()
            .filter_map(|name| self.get(name))
            .collect();
        for module in &self.modules {
            if !self.order.init_genesis.iter().any(|n| n == module.name()) {
                ordered.push(module);
            }
        }
        ordered
    }

    pub fn default_genesis(&self) -> GenesisState {
        self.modules
            .iter()
            .map(|m| (m.name().to_string(), m.default_genesis()))
            .collect()
    }

    /// Every module must be present and valid; unknown modules are rejected.
    pub fn validate_genesis(&self, genesis: &GenesisState) -> Result<(), ModuleError> {
        if let Some(unknown) = genesis.keys().find(|name| self.get(name).is_none()) {
            return Err(ModuleError::UnknownModule(unknown.clone()));
        }
        for module in &self.modules {
            let state = genesis
                .get(module.name())
                .ok_or_else(|| ModuleError::InvalidGenesis {
                    module: module.name().to_string(),
                    reason: "missing from genesis".to_string(),
                })?;
            module.validate_genesis(state)?;
        }
        Ok(())
    }

    pub fn register_interfaces(&self, registry: &InterfaceRegistry) -> Result<(), CodecError> {
        self.modules
            .iter()
            .try_for_each(|m| m.register_interfaces(registry))
    }

    pub fn register_legacy_amino(&self, amino: &LegacyAmino) {
        for module in &self.modules {
            module.register_legacy_amino(amino);
        }
    }

    /// Query methods exposed by each module.
    pub fn query_methods(&self) -> BTreeMap<String, Vec<String>> {
        self.modules
            .iter()
            .map(|m| {
                let name = m.name();
                (
                    name.to_string(),
                    vec![
                        format!("/mini.{name}.v1.Query/State"),
                        format!("/mini.{name}.v1.Query/Params"),
                    ],
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
modules:
  - name: runtime
    config:
      app_name: TestApp
      init_genesis: [bank, auth]
  - name: auth
    config:
      bech32_prefix: test
  - name: bank
"#;

    fn manager() -> ModuleManager {
        let config = AppModulesConfig::from_yaml(YAML).unwrap();
        let runtime: RuntimeModuleConfig = config.module_config(RUNTIME_MODULE).unwrap();
        ModuleManager::from_config(&config, &runtime).unwrap()
    }

    #[test]
    fn test_modules_from_yaml() {
        let manager = manager();
        assert_eq!(manager.module_names(), vec!["auth", "bank"]);
        let order: Vec<&str> = manager.genesis_order().iter().map(|m| m.name()).collect();
        assert_eq!(order, vec!["bank", "auth"]);
    }

    #[test]
    fn test_missing_runtime_module_rejected() {
        let err = AppModulesConfig::from_yaml("modules:\n  - name: auth\n").unwrap_err();
        assert!(matches!(err, ModuleError::InvalidConfig(_)));
    }

    #[test]
    fn test_default_genesis_validates() {
        let manager = manager();
        let genesis = manager.default_genesis();
        manager.validate_genesis(&genesis).unwrap();
        assert_eq!(genesis["auth"]["params"]["bech32_prefix"], "test");
    }

    #[test]
    fn test_validate_genesis_rejects_unknown_and_missing() {
        let manager = manager();
        let mut genesis = manager.default_genesis();
        genesis.insert("mint".to_string(), json!({"params": {}}));
        assert!(matches!(
            manager.validate_genesis(&genesis),
            Err(ModuleError::UnknownModule(_))
        ));

        let mut genesis = manager.default_genesis();
        genesis.remove("bank");
        assert!(matches!(
            manager.validate_genesis(&genesis),
            Err(ModuleError::InvalidGenesis { .. })
        ));
    }

    #[test]
    fn test_unknown_module_in_order_rejected() {
        let runtime = RuntimeModuleConfig {
            app_name: "x".to_string(),
            begin_blockers: vec!["ghost".to_string()],
            end_blockers: vec![],
            init_genesis: vec![],
        };
        assert!(matches!(
            ModuleManager::new(vec![], runtime),
            Err(ModuleError::UnknownModule(_))
        ));
    }

    #[test]
    fn test_register_interfaces_and_amino() {
        let manager = manager();
        let registry = InterfaceRegistry::new();
        registry.register_interface(MSG_INTERFACE).unwrap();
        manager.register_interfaces(&registry).unwrap();
        assert!(registry.is_registered("/mini.bank.v1.MsgSend"));
        assert!(registry.is_registered("/mini.auth.v1.MsgUpdateParams"));

        let amino = LegacyAmino::new();
        manager.register_legacy_amino(&amino);
        assert_eq!(
            amino.name_of("/mini.bank.v1.MsgSend").as_deref(),
            Some("mini/bank/MsgSend")
        );
    }
}
