//! Runtime app manager.
//!
//! Executes the state transitions the node core needs (genesis, empty block
//! finalization) against the root store and answers module queries. Ledger
//! semantics beyond that live in the modules and are out of scope here.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::module::{state_key, GenesisState, ModuleError, ModuleManager, RuntimeModuleConfig};
use super::store::{ChangeSet, CommitInfo, RootStore, StoreError};

const BLOCK_KEY: &str = "runtime/block";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("genesis already initialized at version {0}")]
    GenesisExists(u64),

    #[error("state of module {module} is missing at version {version}")]
    MissingState { module: String, version: u64 },

    #[error("app manager is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown query method {0}")]
    UnknownMethod(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("query failed: {0}")]
    Internal(String),
}

impl From<StoreError> for QueryError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Capability-scoped query entry point handed to server components.
pub type QueryFn = Arc<dyn Fn(&str, &Value) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    State,
    Params,
}

/// A module query method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHandler {
    pub method: String,
    pub module: String,
    pub kind: QueryKind,
}

/// Query methods keyed by full method name.
pub type QueryHandlers = BTreeMap<String, QueryHandler>;

/// Header of a finalized block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub time: String,
    pub num_txs: u64,
    pub app_hash: String,
}

fn encode_header(header: &BlockHeader) -> Result<Value, AppError> {
    serde_json::to_value(header).map_err(|e| AppError::Store(StoreError::Corrupt(e.to_string())))
}

/// The runtime application.
pub struct AppManager {
    name: String,
    store: Arc<dyn RootStore>,
    modules: Arc<ModuleManager>,
    handlers: QueryHandlers,
    closed: AtomicBool,
}

impl std::fmt::Debug for AppManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppManager")
            .field("name", &self.name)
            .field("latest_version", &self.store.latest_version())
            .finish_non_exhaustive()
    }
}

impl AppManager {
    pub fn new(name: impl Into<String>, store: Arc<dyn RootStore>, modules: Arc<ModuleManager>) -> Self {
        let mut handlers = QueryHandlers::new();
        for (module, methods) in modules.query_methods() {
            for method in methods {
                let kind = if method.ends_with("/Params") {
                    QueryKind::Params
                } else {
                    QueryKind::State
                };
                handlers.insert(
                    method.clone(),
                    QueryHandler {
                        method,
                        module: module.clone(),
                        kind,
                    },
                );
            }
        }
        Self {
            name: name.into(),
            store,
            modules,
            handlers,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn RootStore> {
        &self.store
    }

    pub fn module_manager(&self) -> &Arc<ModuleManager> {
        &self.modules
    }

    pub fn query_handlers(&self) -> &QueryHandlers {
        &self.handlers
    }

    /// Verify that the latest committed version holds every module's state.
    ///
    /// A store with no commits is a fresh chain and loads trivially.
    pub fn load_latest(&self) -> Result<u64, AppError> {
        let version = self.store.latest_version();
        if version == 0 {
            info!(app = %self.name, "no committed state, awaiting genesis");
            return Ok(0);
        }
        for module in self.modules.modules() {
            let state = self.store.get(Some(version), &state_key(module.name()))?;
            let state = state.ok_or_else(|| AppError::MissingState {
                module: module.name().to_string(),
                version,
            })?;
            module.validate_genesis(&state)?;
        }
        info!(app = %self.name, version, "loaded latest state");
        Ok(version)
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Closed);
        }
        Ok(())
    }

    /// Validate and commit genesis as version 1.
    pub fn init_genesis(&self, genesis: &GenesisState) -> Result<CommitInfo, AppError> {
        self.ensure_open()?;
        let latest = self.store.latest_version();
        if latest > 0 {
            return Err(AppError::GenesisExists(latest));
        }
        self.modules.validate_genesis(genesis)?;

        let mut changes = ChangeSet::new();
        for module in self.modules.genesis_order() {
            if let Some(state) = genesis.get(module.name()) {
                changes.set(state_key(module.name()), state.clone());
            }
        }
        let header = BlockHeader {
            height: 0,
            time: chrono::Utc::now().to_rfc3339(),
            num_txs: 0,
            app_hash: String::new(),
        };
        changes.set(BLOCK_KEY, encode_header(&header)?);
        let commit = self.store.commit(&changes)?;
        info!(app = %self.name, hash = %commit.hash, "genesis committed");
        Ok(commit)
    }

    pub fn export_genesis(&self) -> Result<GenesisState, AppError> {
        let mut genesis = GenesisState::new();
        for module in self.modules.modules() {
            let state = self
                .store
                .get(None, &state_key(module.name()))?
                .unwrap_or_else(|| module.default_genesis());
            genesis.insert(module.name().to_string(), state);
        }
        Ok(genesis)
    }

    /// Commit a block at `height`.
    pub fn finalize_block(&self, height: u64, num_txs: u64) -> Result<BlockHeader, AppError> {
        self.ensure_open()?;
        let previous_hash = self
            .store
            .last_commit()
            .map(|c| c.hash)
            .unwrap_or_default();
        let mut header = BlockHeader {
            height,
            time: chrono::Utc::now().to_rfc3339(),
            num_txs,
            app_hash: previous_hash,
        };
        let mut changes = ChangeSet::new();
        changes.set(BLOCK_KEY, encode_header(&header)?);
        let commit = self.store.commit(&changes)?;
        header.app_hash = commit.hash;
        debug!(height, version = commit.version, "block finalized");
        Ok(header)
    }

    pub fn latest_block(&self) -> Result<Option<BlockHeader>, AppError> {
        let Some(value) = self.store.get(None, BLOCK_KEY)? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AppError::Store(StoreError::Corrupt(e.to_string())))
    }

    /// Answer a module query. The request may carry `{"height": n}`.
    pub fn query(&self, method: &str, request: &Value) -> Result<Value, QueryError> {
        let handler = self
            .handlers
            .get(method)
            .ok_or_else(|| QueryError::UnknownMethod(method.to_string()))?;
        let height = match request.get("height") {
            None | Some(Value::Null) => None,
            Some(h) => Some(h.as_u64().ok_or_else(|| {
                QueryError::InvalidRequest(format!("height must be an unsigned integer, got {h}"))
            })?),
        };

        let state = self
            .store
            .get(height, &state_key(&handler.module))?
            .unwrap_or(Value::Null);
        Ok(match handler.kind {
            QueryKind::State => state,
            QueryKind::Params => state.get("params").cloned().unwrap_or(Value::Null),
        })
    }

    /// Query entry point for server components.
    pub fn query_fn(self: &Arc<Self>) -> QueryFn {
        let app = Arc::clone(self);
        Arc::new(move |method: &str, request: &Value| app.query(method, request))
    }

    /// Idempotent.
    pub fn close(&self) -> Result<(), AppError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(app = %self.name, "app manager closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Builds the [`AppManager`] once the store is open.
#[derive(Debug, Clone)]
pub struct AppBuilder {
    runtime: RuntimeModuleConfig,
    modules: Arc<ModuleManager>,
}

impl AppBuilder {
    pub fn new(runtime: RuntimeModuleConfig, modules: Arc<ModuleManager>) -> Self {
        Self { runtime, modules }
    }

    pub fn app_name(&self) -> &str {
        &self.runtime.app_name
    }

    pub fn build(&self, store: Arc<dyn RootStore>) -> AppManager {
        AppManager::new(self.runtime.app_name.clone(), store, Arc::clone(&self.modules))
    }
}
