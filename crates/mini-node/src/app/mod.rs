//! # Application Builder
//!
//! Composes the application's provider registry and builds the single
//! [`Application`] instance of a server-mode process.
//!
//! ## Build sequence
//!
//! ```text
//!   app_config() + caller registry
//!        │ resolve
//!        ▼
//!   StoreBuilder ──build──► store ──► AppBuilder ──► AppManager
//!                                                       │ load_latest
//!                                                       ▼
//!                                     seal InterfaceRegistry ──► Application
//! ```
//!
//! Construction is all-or-nothing: a store that fails to open, or state
//! that fails to load, aborts the build and nothing half-initialized is
//! returned. The store is closed before a load failure is reported.

pub mod genesis;

use std::sync::Arc;

use mini_inject::{configs, provide0, provide1, ProviderRegistry, ResolvedValues, TypeKey};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::provide_root_store_config;
use crate::error::NodeError;
use crate::runtime::app::{AppBuilder, AppManager, QueryError, QueryFn, QueryHandlers};
use crate::runtime::codec::{Codec, InterfaceRegistry, LegacyAmino, TxConfig};
use crate::runtime::module::{AppModulesConfig, ModuleManager};
use crate::runtime::store::{RootStore, StoreBuilder};
use crate::runtime::{codec_providers, default_service_bindings};

/// Module declaration embedded in the binary.
pub const APP_YAML: &str = include_str!("app.yaml");

/// Provider registry of the application: module set, runtime bindings,
/// codecs and the root store config.
pub fn app_config() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry
        .provide(provide0("app.load_yaml", || {
            Ok(AppModulesConfig::from_yaml(APP_YAML)?)
        }))
        .extend(&default_service_bindings())
        .extend(&codec_providers())
        .provide(provide1("app.root_store_config", provide_root_store_config));
    registry
}

/// The composed runtime object of a server-mode process.
pub struct Application {
    app_manager: Arc<AppManager>,
    module_manager: Arc<ModuleManager>,
    codec: Arc<Codec>,
    interface_registry: Arc<InterfaceRegistry>,
    legacy_amino: Arc<LegacyAmino>,
    tx_config: Arc<TxConfig>,
    store: Arc<dyn RootStore>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("app_manager", &self.app_manager)
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Resolve and build the application.
    ///
    /// `caller` is merged after [`app_config`]; it typically supplies the
    /// [`GlobalConfig`](crate::config::GlobalConfig) and the client context
    /// provider. `extra_outputs` are resolved in the same pass and returned
    /// alongside the application.
    pub fn new(
        caller: &ProviderRegistry,
        extra_outputs: &[TypeKey],
    ) -> Result<(Self, ResolvedValues), NodeError> {
        let registry = configs([&app_config(), caller]);

        let mut requested = vec![
            TypeKey::of::<StoreBuilder>(),
            TypeKey::of::<AppBuilder>(),
            TypeKey::of::<ModuleManager>(),
            TypeKey::of::<Codec>(),
            TypeKey::of::<InterfaceRegistry>(),
            TypeKey::of::<LegacyAmino>(),
            TypeKey::of::<TxConfig>(),
        ];
        requested.extend_from_slice(extra_outputs);
        let resolved = registry.resolve(&requested)?;

        let store_builder = resolved.get::<StoreBuilder>()?;
        let app_builder = resolved.get::<AppBuilder>()?;

        store_builder
            .build()
            .map_err(|e| NodeError::StoreUnavailable {
                reason: e.to_string(),
            })?;
        let store = store_builder
            .get()
            .ok_or_else(|| NodeError::StoreUnavailable {
                reason: format!(
                    "store builder for backend {:?} produced no store",
                    store_builder.config().backend
                ),
            })?;

        let app_manager = Arc::new(app_builder.build(Arc::clone(&store)));
        if let Err(e) = app_manager.load_latest() {
            if let Err(close_err) = store.close() {
                warn!(error = %close_err, "failed to close store after load failure");
            }
            return Err(NodeError::LoadLatestFailed {
                reason: e.to_string(),
            });
        }

        let interface_registry = resolved.get::<InterfaceRegistry>()?;
        interface_registry.seal();

        info!(
            app = %app_manager.name(),
            backend = %store.backend(),
            version = store.latest_version(),
            interfaces = interface_registry.list_all_interfaces().len(),
            "application built"
        );

        let app = Self {
            module_manager: resolved.get::<ModuleManager>()?,
            codec: resolved.get::<Codec>()?,
            legacy_amino: resolved.get::<LegacyAmino>()?,
            tx_config: resolved.get::<TxConfig>()?,
            interface_registry,
            app_manager,
            store,
        };
        Ok((app, resolved))
    }

    pub fn name(&self) -> &str {
        self.app_manager.name()
    }

    pub fn app_codec(&self) -> &Arc<Codec> {
        &self.codec
    }

    pub fn interface_registry(&self) -> &Arc<InterfaceRegistry> {
        &self.interface_registry
    }

    pub fn legacy_amino(&self) -> &Arc<LegacyAmino> {
        &self.legacy_amino
    }

    pub fn tx_config(&self) -> &Arc<TxConfig> {
        &self.tx_config
    }

    pub fn store(&self) -> &Arc<dyn RootStore> {
        &self.store
    }

    pub fn module_manager(&self) -> &Arc<ModuleManager> {
        &self.module_manager
    }

    pub fn app_manager(&self) -> &Arc<AppManager> {
        &self.app_manager
    }

    pub fn query_handlers(&self) -> &QueryHandlers {
        self.app_manager.query_handlers()
    }

    pub fn query_fn(&self) -> QueryFn {
        self.app_manager.query_fn()
    }

    pub fn query(&self, method: &str, request: &Value) -> Result<Value, QueryError> {
        self.app_manager.query(method, request)
    }

    /// Close the store, then the app manager.
    ///
    /// Both closes are attempted; the first error is returned.
    pub fn close(&self) -> Result<(), NodeError> {
        let store_result = self.store.close();
        let app_result = self.app_manager.close();

        match (store_result, app_result) {
            (Ok(()), Ok(())) => {
                info!(app = %self.name(), "application closed");
                Ok(())
            }
            (Err(store_err), app_result) => {
                if let Err(app_err) = app_result {
                    warn!(error = %app_err, "app manager close failed after store close failure");
                }
                Err(NodeError::CloseFailed {
                    reason: format!("store: {store_err}"),
                })
            }
            (Ok(()), Err(app_err)) => Err(NodeError::CloseFailed {
                reason: format!("app manager: {app_err}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, GlobalConfig};
    use crate::runtime::codec::AccountAddressCodec;

    fn caller(home: &std::path::Path, backend: &str) -> ProviderRegistry {
        let config = GlobalConfig::from_pairs([
            (keys::HOME, Value::from(home.display().to_string())),
            (keys::APP_DB_BACKEND, Value::from(backend)),
            (keys::SC_KEEP_RECENT, Value::from(100u64)),
            (keys::SC_INTERVAL, Value::from(10u64)),
        ]);
        let mut registry = ProviderRegistry::new();
        registry.supply(config);
        registry
    }

    #[test]
    fn test_app_yaml_parses() {
        let config = AppModulesConfig::from_yaml(APP_YAML).unwrap();
        assert!(config.entry("staking").is_some());
    }

    #[test]
    fn test_build_seals_registry_and_derives_store_config() {
        let dir = tempfile::tempdir().unwrap();
        let (app, resolved) = Application::new(
            &caller(dir.path(), "memdb"),
            &[TypeKey::of::<AccountAddressCodec>()],
        )
        .unwrap();

        assert!(app.interface_registry().is_sealed());
        assert!(app
            .interface_registry()
            .is_registered("/mini.bank.v1.MsgSend"));
        assert_eq!(app.name(), "MiniApp");
        assert_eq!(
            resolved.get::<AccountAddressCodec>().unwrap().0.prefix(),
            "mini"
        );
        let store_builder = resolved.get::<StoreBuilder>().unwrap();
        assert_eq!(
            store_builder.config().options.iavl.minimum_keep_versions,
            100
        );
        app.close().unwrap();
        assert!(app.store().is_closed());
        assert!(app.app_manager().is_closed());
    }

    #[test]
    fn test_unknown_backend_is_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = Application::new(&caller(dir.path(), "rocksdb"), &[]).unwrap_err();
        assert!(matches!(err, NodeError::StoreUnavailable { .. }));
    }
}
