//! # Consensus Component
//!
//! Single-validator block production against the runtime app manager.
//!
//! On start, a store with no committed state is initialized from
//! `<home>/config/genesis.json` (or the modules' default genesis when the
//! file is absent). A block is then finalized every `timeout_commit` until
//! the component is stopped or the node is cancelled.
//!
//! Also contributes the CometBFT and node services to the query router.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mini_telemetry::{log_event, metric_inc, BLOCKS_FINALIZED};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::grpc::ServiceRegistrar;
use super::{ComponentContext, ComponentError, ServiceComponent};
use crate::app::genesis::{genesis_path, GenesisDoc};
use crate::runtime::app::{AppManager, BlockHeader, QueryError};

pub const NAME: &str = "consensus";
pub const COMET_SERVICE: &str = "cometbft.service.v1.Service";
pub const NODE_SERVICE: &str = "mini.node.v1.Service";

#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    pub home: PathBuf,
    pub chain_id: String,
    pub moniker: String,
    pub timeout_commit: Duration,
    pub minimum_gas_prices: String,
}

struct BlockLoop {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ConsensusComponent {
    app: Arc<AppManager>,
    config: ConsensusConfig,
    running: Mutex<Option<BlockLoop>>,
}

impl ConsensusComponent {
    pub fn new(app: Arc<AppManager>, config: ConsensusConfig) -> Self {
        Self {
            app,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Services answered from consensus state: CometBFT and node.
    pub fn registrars(&self) -> Vec<ServiceRegistrar> {
        let mut comet = ServiceRegistrar::new(COMET_SERVICE);
        let app = Arc::clone(&self.app);
        comet.register("GetLatestBlock", move |_: &Value| {
            let block = app
                .latest_block()
                .map_err(|e| QueryError::Internal(e.to_string()))?;
            Ok(json!({ "block": block }))
        });
        let node_info = json!({
            "moniker": self.config.moniker,
            "network": self.config.chain_id,
            "version": env!("CARGO_PKG_VERSION"),
            "app_name": self.app.name(),
        });
        comet.register("GetNodeInfo", move |_: &Value| Ok(node_info.clone()));
        comet.register("GetSyncing", |_: &Value| Ok(json!({ "syncing": false })));

        let mut node = ServiceRegistrar::new(NODE_SERVICE);
        let app = Arc::clone(&self.app);
        node.register("Status", move |_: &Value| {
            let height = app
                .latest_block()
                .map_err(|e| QueryError::Internal(e.to_string()))?
                .map(|b| b.height)
                .unwrap_or(0);
            Ok(json!({
                "height": height,
                "app_version": app.store().latest_version(),
            }))
        });
        let minimum_gas_price = self.config.minimum_gas_prices.clone();
        node.register("Config", move |_: &Value| {
            Ok(json!({ "minimum_gas_price": minimum_gas_price }))
        });

        vec![comet, node]
    }

    fn error(&self, message: impl Into<String>) -> ComponentError {
        ComponentError::new(NAME, message)
    }

    fn ensure_genesis(&self) -> Result<(), ComponentError> {
        if self.app.store().latest_version() > 0 {
            return Ok(());
        }
        let path = genesis_path(&self.config.home);
        let app_state = if path.exists() {
            let doc = GenesisDoc::read(&path).map_err(|e| self.error(e.to_string()))?;
            if doc.chain_id != self.config.chain_id {
                return Err(self.error(format!(
                    "genesis chain id {} does not match configured {}",
                    doc.chain_id, self.config.chain_id
                )));
            }
            doc.app_state
        } else {
            self.app.module_manager().default_genesis()
        };
        self.app
            .init_genesis(&app_state)
            .map_err(|e| self.error(format!("init genesis: {e}")))?;
        log_event!(info, NAME, "genesis initialized", chain_id = %self.config.chain_id);
        Ok(())
    }
}

/// Finalize `height` on the blocking pool; a filedb commit rewrites the
/// snapshot file.
async fn finalize_off_runtime(app: &Arc<AppManager>, height: u64) -> Result<BlockHeader, String> {
    let app = Arc::clone(app);
    tokio::task::spawn_blocking(move || app.finalize_block(height, 0))
        .await
        .map_err(|e| format!("finalize task failed: {e}"))?
        .map_err(|e| e.to_string())
}

async fn run_blocks(
    app: Arc<AppManager>,
    timeout_commit: Duration,
    mut stop: watch::Receiver<bool>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut height = match app.latest_block() {
        Ok(block) => block.map(|b| b.height).unwrap_or(0) + 1,
        Err(e) => {
            log_event!(error, NAME, "cannot read latest block", error = %e);
            return;
        }
    };
    let mut ticker = tokio::time::interval(timeout_commit);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match finalize_off_runtime(&app, height).await {
                    Ok(header) => {
                        metric_inc!(BLOCKS_FINALIZED);
                        log_event!(debug, NAME, "block finalized", height = header.height, app_hash = %header.app_hash);
                        height += 1;
                    }
                    Err(e) => {
                        log_event!(error, NAME, "finalize block failed", height, error = %e);
                        break;
                    }
                }
            }
            _ = async { let _ = stop.wait_for(|stopped| *stopped).await; } => break,
            _ = async { let _ = cancel.wait_for(|cancelled| *cancelled).await; } => break,
        }
    }
}

#[async_trait::async_trait]
impl ServiceComponent for ConsensusComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn init(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        if self.config.chain_id.trim().is_empty() {
            return Err(self.error("chain id is empty"));
        }
        if self.config.timeout_commit.is_zero() {
            return Err(self.error("timeout_commit must be positive"));
        }
        Ok(())
    }

    async fn start(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        if self.running.lock().is_some() {
            return Err(self.error("already running"));
        }
        self.ensure_genesis()?;

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_blocks(
            Arc::clone(&self.app),
            self.config.timeout_commit,
            stop_rx,
            ctx.subscribe(),
        ));
        *self.running.lock() = Some(BlockLoop { stop, task });

        log_event!(
            info,
            NAME,
            "block production started",
            moniker = %self.config.moniker,
            timeout_commit = %humantime::format_duration(self.config.timeout_commit)
        );
        Ok(())
    }

    async fn stop(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        let Some(BlockLoop { stop, mut task }) = self.running.lock().take() else {
            return Ok(());
        };
        stop.send_replace(true);
        match tokio::time::timeout(ctx.stop_timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.error(format!("block loop failed: {e}"))),
            Err(_) => {
                task.abort();
                Err(self.error("block loop did not stop in time"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PruningOption;
    use crate::runtime::app::AppBuilder;
    use crate::runtime::module::{AppModulesConfig, ModuleManager, RuntimeModuleConfig};
    use crate::runtime::store::VersionedStore;

    fn component(home: PathBuf, timeout_commit: Duration) -> ConsensusComponent {
        let modules = AppModulesConfig::from_yaml(
            "modules:\n  - name: runtime\n    config:\n      app_name: T\n  - name: bank\n",
        )
        .unwrap();
        let runtime: RuntimeModuleConfig = modules.module_config("runtime").unwrap();
        let manager = Arc::new(ModuleManager::from_config(&modules, &runtime).unwrap());
        let store = Arc::new(VersionedStore::in_memory(PruningOption {
            keep_recent: 0,
            interval: 0,
        }));
        let app = Arc::new(AppBuilder::new(runtime, manager).build(store));
        ConsensusComponent::new(
            app,
            ConsensusConfig {
                home,
                chain_id: "mini-test".to_string(),
                moniker: "node0".to_string(),
                timeout_commit,
                minimum_gas_prices: "0mini".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_start_initializes_genesis_and_produces_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let consensus = component(dir.path().to_path_buf(), Duration::from_millis(10));
        let ctx = ComponentContext::new(Duration::from_secs(2));

        consensus.init(&ctx).await.unwrap();
        consensus.start(&ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        consensus.stop(&ctx).await.unwrap();

        let version = consensus.app.store().latest_version();
        assert!(version >= 2, "expected blocks after genesis, got version {version}");
        let block = consensus.app.latest_block().unwrap().unwrap();
        assert_eq!(block.height, version - 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_finalize_runs_off_the_runtime_thread() {
        let dir = tempfile::tempdir().unwrap();
        let consensus = component(dir.path().to_path_buf(), Duration::from_secs(1));
        consensus.ensure_genesis().unwrap();

        let header = finalize_off_runtime(&consensus.app, 1).await.unwrap();

        assert_eq!(header.height, 1);
        assert_eq!(consensus.app.latest_block().unwrap().unwrap().height, 1);
    }

    #[tokio::test]
    async fn test_genesis_chain_id_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        GenesisDoc::new("other-chain", Default::default())
            .write(&genesis_path(dir.path()))
            .unwrap();
        let consensus = component(dir.path().to_path_buf(), Duration::from_secs(1));
        let ctx = ComponentContext::new(Duration::from_secs(1));
        let err = consensus.start(&ctx).await.unwrap_err();
        assert!(err.message.contains("does not match"));
    }

    #[tokio::test]
    async fn test_registrars_answer_node_queries() {
        let dir = tempfile::tempdir().unwrap();
        let consensus = component(dir.path().to_path_buf(), Duration::from_secs(1));
        let registrars = consensus.registrars();
        let methods: Vec<&str> = registrars.iter().flat_map(|r| r.method_names()).collect();
        assert!(methods.contains(&"/cometbft.service.v1.Service/GetLatestBlock"));
        assert!(methods.contains(&"/mini.node.v1.Service/Config"));
    }

    #[test]
    fn test_zero_timeout_rejected_on_init() {
        let dir = tempfile::tempdir().unwrap();
        let consensus = component(dir.path().to_path_buf(), Duration::ZERO);
        let ctx = ComponentContext::new(Duration::from_secs(1));
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(rt.block_on(consensus.init(&ctx)).is_err());
    }
}
