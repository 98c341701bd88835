//! # Lifecycle Manager
//!
//! Drives the composed components through `init -> start -> stop`.
//!
//! - `init` and `start` walk the chain in composition order.
//! - If component `k` fails to start, components `0..k` are stopped in
//!   reverse order before the failure is reported.
//! - `shutdown` stops every running component in reverse order, attempts
//!   all of them, and reports every failure.

use std::sync::Arc;

use mini_telemetry::{component_span, COMPONENTS_RUNNING, COMPONENT_TRANSITIONS};
use parking_lot::RwLock;
use tracing::{error, info, warn, Instrument};

use crate::components::{ComponentContext, ComponentError, ComponentStatus, ServiceComponent};
use crate::error::NodeError;

fn record(component: &str, phase: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    COMPONENT_TRANSITIONS
        .with_label_values(&[component, phase, outcome])
        .inc();
}

pub struct LifecycleManager {
    components: Vec<Arc<dyn ServiceComponent>>,
    status: RwLock<Vec<ComponentStatus>>,
}

impl LifecycleManager {
    pub fn new(components: Vec<Arc<dyn ServiceComponent>>) -> Self {
        let status = vec![ComponentStatus::Registered; components.len()];
        Self {
            components,
            status: RwLock::new(status),
        }
    }

    fn set_status(&self, index: usize, status: ComponentStatus) {
        self.status.write()[index] = status;
        let running = self
            .status
            .read()
            .iter()
            .filter(|s| **s == ComponentStatus::Running)
            .count();
        COMPONENTS_RUNNING.set(running as f64);
    }

    /// `init_all` then `start_all`.
    pub async fn run(&self, ctx: &ComponentContext) -> Result<(), NodeError> {
        self.init_all(ctx).await?;
        self.start_all(ctx).await
    }

    /// Initialize every component in order; the first failure aborts.
    pub async fn init_all(&self, ctx: &ComponentContext) -> Result<(), NodeError> {
        for (index, component) in self.components.iter().enumerate() {
            info!("[Lifecycle] Initializing {}", component.name());
            let span = component_span!("init", component = component.name());
            let result = component.init(ctx).instrument(span).await;
            record(component.name(), "init", result.is_ok());
            match result {
                Ok(()) => self.set_status(index, ComponentStatus::Initialized),
                Err(e) => {
                    error!("[Lifecycle] Init failed: {}", e);
                    self.set_status(index, ComponentStatus::Failed);
                    return Err(NodeError::ComponentInitFailed(e));
                }
            }
        }
        Ok(())
    }

    /// Start every component in order, rolling back on the first failure.
    pub async fn start_all(&self, ctx: &ComponentContext) -> Result<(), NodeError> {
        for (index, component) in self.components.iter().enumerate() {
            info!("[Lifecycle] Starting {}", component.name());
            self.set_status(index, ComponentStatus::Starting);
            let span = component_span!("start", component = component.name());
            let result = component.start(ctx).instrument(span).await;
            record(component.name(), "start", result.is_ok());

            if let Err(e) = result {
                error!("[Lifecycle] Start failed: {}", e);
                self.set_status(index, ComponentStatus::Failed);
                let rollback = self.stop_range(ctx, index).await;
                return Err(NodeError::ComponentStartFailed {
                    source: e,
                    rollback,
                });
            }
            self.set_status(index, ComponentStatus::Running);
        }
        info!("[Lifecycle] All {} components running", self.components.len());
        Ok(())
    }

    /// Stop every running component in reverse order.
    pub async fn shutdown(&self, ctx: &ComponentContext) -> Result<(), NodeError> {
        let errors = self.stop_range(ctx, self.components.len()).await;
        if errors.is_empty() {
            info!("[Lifecycle] Shutdown complete");
            Ok(())
        } else {
            Err(NodeError::ComponentStopFailed(errors))
        }
    }

    /// Stop running components among `0..end`, last first. Each stop is
    /// bounded by the context's stop timeout.
    async fn stop_range(&self, ctx: &ComponentContext, end: usize) -> Vec<ComponentError> {
        let mut errors = Vec::new();
        for index in (0..end).rev() {
            if self.status.read()[index] != ComponentStatus::Running {
                continue;
            }
            let component = &self.components[index];
            info!("[Lifecycle] Stopping {}", component.name());
            let span = component_span!("stop", component = component.name());
            let result = match tokio::time::timeout(ctx.stop_timeout, component.stop(ctx))
                .instrument(span)
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ComponentError::new(
                    component.name(),
                    format!(
                        "stop timed out after {}",
                        humantime::format_duration(ctx.stop_timeout)
                    ),
                )),
            };
            record(component.name(), "stop", result.is_ok());
            match result {
                Ok(()) => self.set_status(index, ComponentStatus::Stopped),
                Err(e) => {
                    warn!("[Lifecycle] Stop failed: {}", e);
                    self.set_status(index, ComponentStatus::Failed);
                    errors.push(e);
                }
            }
        }
        errors
    }

    pub fn status(&self) -> Vec<(&'static str, ComponentStatus)> {
        let status = self.status.read();
        self.components
            .iter()
            .zip(status.iter())
            .map(|(c, s)| (c.name(), *s))
            .collect()
    }

    pub fn print_status(&self) {
        info!("===========================================");
        info!("  Component Status");
        info!("===========================================");
        for (name, status) in self.status() {
            info!("  {} {:<12} {:?}", status.icon(), name, status);
        }
        info!("===========================================");
    }
}
