//! # Server Components
//!
//! The long-running parts of a server-mode process. Each is constructed by
//! the composer, then driven by the lifecycle manager through
//! `init -> start -> stop`. Nothing binds a socket or spawns a task before
//! `start`.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`StoreComponent`] | Holds the root store for the lifetime of the node |
//! | [`ConsensusComponent`] | Genesis on first start, then a local block loop |
//! | [`QueryGrpcComponent`] | Query router over HTTP (`POST /<method>`) |
//! | [`GatewayComponent`] | REST-style gateway with forwarded service routes |
//! | [`RestComponent`] | Legacy REST queries and `/metrics` |

pub mod consensus;
pub mod gateway;
pub mod grpc;
pub mod listener;
pub mod rest;
pub mod store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

pub use consensus::ConsensusComponent;
pub use gateway::{GatewayComponent, GatewayRoute};
pub use grpc::{MethodHandler, QueryGrpcComponent, QueryRouter, ServiceRegistrar};
pub use rest::RestComponent;
pub use store::StoreComponent;

/// Component error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentError {
    pub component: &'static str,
    pub message: String,
}

impl ComponentError {
    pub fn new(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            message: message.into(),
        }
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.component, self.message)
    }
}

impl std::error::Error for ComponentError {}

/// Component status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStatus {
    /// Composed, not yet initialized.
    Registered,
    /// `init` succeeded.
    Initialized,
    /// `start` in progress.
    Starting,
    /// Running normally.
    Running,
    /// Stopped gracefully.
    Stopped,
    /// Failed with error.
    Failed,
}

impl ComponentStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Running => "✅",
            Self::Registered | Self::Initialized | Self::Starting => "⏳",
            Self::Stopped => "⏹️",
            Self::Failed => "❌",
        }
    }
}

/// Shared by every component for one run of the node.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    /// Upper bound on each component's `stop`.
    pub stop_timeout: Duration,
    cancel: Arc<watch::Sender<bool>>,
}

impl ComponentContext {
    pub fn new(stop_timeout: Duration) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            stop_timeout,
            cancel: Arc::new(cancel),
        }
    }

    /// Signal every task holding a subscription to wind down.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        // Sender lives in self, so wait_for only errors after drop.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// A long-running server component.
#[async_trait::async_trait]
pub trait ServiceComponent: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validate configuration; must not bind or spawn.
    async fn init(&self, ctx: &ComponentContext) -> Result<(), ComponentError>;

    async fn start(&self, ctx: &ComponentContext) -> Result<(), ComponentError>;

    /// Must complete within `ctx.stop_timeout`.
    async fn stop(&self, ctx: &ComponentContext) -> Result<(), ComponentError>;
}
