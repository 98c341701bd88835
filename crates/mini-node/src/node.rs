//! # Node Runtime
//!
//! A running server-mode node: the application, its composed components and
//! the lifecycle manager driving them.
//!
//! ## Startup Sequence
//!
//! 1. Compose the component chain
//! 2. `init` then `start` every component in order
//! 3. Run until the shutdown signal
//!
//! ## Shutdown Sequence
//!
//! 1. Cancel the component context
//! 2. Stop running components in reverse order
//! 3. Close the application (store, then app manager)
//!
//! Any failure during startup closes the application before it is reported.

use std::future::Future;
use std::net::SocketAddr;

use tracing::{info, warn};

use crate::app::Application;
use crate::client::ClientContext;
use crate::components::{ComponentContext, ComponentStatus};
use crate::config::{keys, GlobalConfig};
use crate::error::NodeError;
use crate::lifecycle::LifecycleManager;
use crate::wiring::{compose, ServerComponents};

/// Bound listener addresses of a running node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAddresses {
    pub grpc: Option<SocketAddr>,
    pub gateway: Option<SocketAddr>,
    pub rest: Option<SocketAddr>,
}

pub struct NodeRuntime {
    app: Application,
    components: ServerComponents,
    lifecycle: LifecycleManager,
    ctx: ComponentContext,
}

fn close_after_failure(app: &Application, failure: NodeError) -> NodeError {
    if let Err(e) = app.close() {
        warn!(error = %e, "failed to close application after startup failure");
    }
    failure
}

impl NodeRuntime {
    /// Compose and start every component.
    pub async fn start(
        app: Application,
        config: &GlobalConfig,
        client: &ClientContext,
    ) -> Result<Self, NodeError> {
        info!("===========================================");
        info!("  Mini-Chain Node v{}", env!("CARGO_PKG_VERSION"));
        info!("  App: {}  Chain: {}", app.name(), client.chain_id);
        info!("===========================================");

        let stop_timeout = match config.get_duration(keys::SHUTDOWN_TIMEOUT) {
            Ok(timeout) => timeout,
            Err(e) => return Err(close_after_failure(&app, e.into())),
        };
        let components = match compose(&app, config, client) {
            Ok(components) => components,
            Err(e) => return Err(close_after_failure(&app, e)),
        };

        let lifecycle = LifecycleManager::new(components.ordered());
        let ctx = ComponentContext::new(stop_timeout);
        if let Err(e) = lifecycle.run(&ctx).await {
            ctx.cancel();
            return Err(close_after_failure(&app, e));
        }
        lifecycle.print_status();

        Ok(Self {
            app,
            components,
            lifecycle,
            ctx,
        })
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn components(&self) -> &ServerComponents {
        &self.components
    }

    pub fn status(&self) -> Vec<(&'static str, ComponentStatus)> {
        self.lifecycle.status()
    }

    pub fn addresses(&self) -> NodeAddresses {
        NodeAddresses {
            grpc: self.components.query_grpc.listener().local_addr(),
            gateway: self.components.gateway.listener().local_addr(),
            rest: self.components.rest.listener().local_addr(),
        }
    }

    /// Stop every component, then close the application.
    ///
    /// The application is closed even if a component failed to stop; the
    /// stop failure is reported first.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        info!("Initiating graceful shutdown...");
        self.ctx.cancel();
        let stopped = self.lifecycle.shutdown(&self.ctx).await;
        let closed = self.app.close();
        match (stopped, closed) {
            (Err(stop), closed) => {
                if let Err(close) = closed {
                    warn!(error = %close, "application close failed after stop failure");
                }
                Err(stop)
            }
            (Ok(()), closed) => {
                closed?;
                info!("Node shutdown complete");
                Ok(())
            }
        }
    }

    /// Run until `signal` resolves, then shut down.
    pub async fn run_until<F>(self, signal: F) -> Result<(), NodeError>
    where
        F: Future<Output = ()>,
    {
        info!("Node is running. Press Ctrl+C to stop.");
        signal.await;
        self.shutdown().await
    }
}
