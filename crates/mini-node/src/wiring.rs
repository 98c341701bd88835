//! # Server Component Composer
//!
//! Builds the ordered component chain of a server-mode process from the
//! application, the global config and the client context.
//!
//! ```text
//!   Store ──► Consensus ──► QueryGrpc ──► Gateway ──► Rest
//!                 │             ▲            │
//!                 └─ registrars ┘            └─ routes forwarded to the
//!                                               query router
//! ```
//!
//! Composition is all-or-nothing and binds nothing; sockets are opened by
//! the lifecycle manager on `start`.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::info;

use crate::app::Application;
use crate::client::ClientContext;
use crate::components::consensus::{ConsensusConfig, COMET_SERVICE, NODE_SERVICE};
use crate::components::{
    ConsensusComponent, GatewayComponent, GatewayRoute, QueryGrpcComponent, QueryRouter,
    RestComponent, ServiceComponent, ServiceRegistrar, StoreComponent,
};
use crate::config::{keys, GlobalConfig};
use crate::error::NodeError;
use crate::runtime::app::QueryError;
use crate::runtime::codec::TxConfig;

pub const TX_SERVICE: &str = "mini.tx.v1.Service";

/// Gateway paths forwarded to service methods.
const SERVICE_ROUTES: &[(&str, &str, &str)] = &[
    ("/cometbft/v1/blocks/latest", COMET_SERVICE, "GetLatestBlock"),
    ("/cometbft/v1/node_info", COMET_SERVICE, "GetNodeInfo"),
    ("/cometbft/v1/syncing", COMET_SERVICE, "GetSyncing"),
    ("/mini/node/v1/status", NODE_SERVICE, "Status"),
    ("/mini/node/v1/config", NODE_SERVICE, "Config"),
    ("/mini/tx/v1/config", TX_SERVICE, "Config"),
    ("/mini/tx/v1/decode", TX_SERVICE, "Decode"),
];

/// The composed chain, in start order.
pub struct ServerComponents {
    pub store: Arc<StoreComponent>,
    pub consensus: Arc<ConsensusComponent>,
    pub query_grpc: Arc<QueryGrpcComponent>,
    pub gateway: Arc<GatewayComponent>,
    pub rest: Arc<RestComponent>,
}

impl ServerComponents {
    pub fn ordered(&self) -> Vec<Arc<dyn ServiceComponent>> {
        vec![
            Arc::clone(&self.store) as Arc<dyn ServiceComponent>,
            Arc::clone(&self.consensus) as Arc<dyn ServiceComponent>,
            Arc::clone(&self.query_grpc) as Arc<dyn ServiceComponent>,
            Arc::clone(&self.gateway) as Arc<dyn ServiceComponent>,
            Arc::clone(&self.rest) as Arc<dyn ServiceComponent>,
        ]
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.ordered().iter().map(|c| c.name()).collect()
    }
}

fn construct<T>(
    component: &'static str,
    build: impl FnOnce() -> anyhow::Result<T>,
) -> Result<T, NodeError> {
    build().map_err(|source| NodeError::ComponentConstructionFailed { component, source })
}

/// Transaction service answered offline from the tx config.
fn tx_registrar(tx_config: Arc<TxConfig>) -> ServiceRegistrar {
    let mut registrar = ServiceRegistrar::new(TX_SERVICE);
    let options = json!(tx_config.options());
    registrar.register("Config", move |_: &Value| Ok(options.clone()));
    registrar.register("Decode", move |request: &Value| {
        let encoded = request
            .get("tx")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::InvalidRequest("missing tx".to_string()))?;
        let bytes = hex::decode(encoded)
            .map_err(|e| QueryError::InvalidRequest(format!("tx is not hex: {e}")))?;
        let tx = tx_config
            .decode(&bytes)
            .map_err(|e| QueryError::InvalidRequest(e.to_string()))?;
        Ok(json!(tx))
    });
    registrar
}

pub fn compose(
    app: &Application,
    config: &GlobalConfig,
    client: &ClientContext,
) -> Result<ServerComponents, NodeError> {
    let store = construct("store", || Ok(Arc::new(StoreComponent::new(Arc::clone(app.store())))))?;

    let consensus = construct("consensus", || {
        let consensus_config = ConsensusConfig {
            home: config.home()?,
            chain_id: client.chain_id.clone(),
            moniker: config.get_str(keys::COMET_MONIKER)?,
            timeout_commit: config.get_duration(keys::COMET_TIMEOUT_COMMIT)?,
            minimum_gas_prices: config.get_str(keys::MINIMUM_GAS_PRICES)?,
        };
        Ok(Arc::new(ConsensusComponent::new(
            Arc::clone(app.app_manager()),
            consensus_config,
        )))
    })?;

    let router = construct("query-grpc", || {
        let mut router = QueryRouter::new(app.query_fn(), app.query_handlers().keys().cloned());
        for registrar in consensus.registrars() {
            router
                .merge(registrar)
                .context("registering consensus services")?;
        }
        router
            .merge(tx_registrar(Arc::clone(&client.tx_config)))
            .context("registering tx service")?;
        Ok(Arc::new(router))
    })?;
    let query_grpc = construct("query-grpc", || {
        Ok(Arc::new(QueryGrpcComponent::new(
            config.get_str(keys::GRPC_ADDRESS)?,
            Arc::clone(&router),
        )))
    })?;

    let gateway = construct("gateway", || {
        let gateway = GatewayComponent::new(
            config.get_str(keys::GATEWAY_ADDRESS)?,
            Arc::clone(app.interface_registry()),
            app.query_fn(),
        );
        for (path, service, method) in SERVICE_ROUTES {
            let route = GatewayRoute::new(*path, format!("/{service}/{method}"));
            gateway.register_route(route, Arc::clone(&router))?;
        }
        Ok(Arc::new(gateway))
    })?;

    let rest = construct("rest", || {
        Ok(Arc::new(RestComponent::new(
            config.get_str(keys::REST_ADDRESS)?,
            app.query_fn(),
        )))
    })?;

    let components = ServerComponents {
        store,
        consensus,
        query_grpc,
        gateway,
        rest,
    };
    info!(
        components = ?components.names(),
        methods = router.methods().len(),
        "server components composed"
    );
    Ok(components)
}
