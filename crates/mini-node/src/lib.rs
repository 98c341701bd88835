//! # Mini-Chain Node Library
//!
//! Bootstrap and composition core of the `minid` binary, exposed for
//! testing. The main entry point is the `main.rs` binary.
//!
//! ## Data Flow
//!
//! ```text
//!   flags ─┐
//!   env   ─┼─► ConfigOverlay ──► GlobalConfig
//!   app.toml┘                        │
//!                                    ▼
//!            app_config() + caller registry ──resolve──┐
//!                                                      │
//!                      ┌────── requires_application? ──┴──────┐
//!                      │ no                               yes │
//!                      ▼                                      ▼
//!               ClientContext                           Application
//!               AutoCliOptions                               │ compose
//!                                                            ▼
//!                        Store → Consensus → QueryGrpc → Gateway → Rest
//!                                                            │
//!                                                    LifecycleManager
//! ```

#![allow(clippy::type_complexity)]

pub mod app;
pub mod bootstrap;
pub mod cli;
pub mod client;
pub mod components;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod node;
pub mod runtime;
pub mod wiring;

pub use app::{app_config, Application};
pub use bootstrap::{bootstrap, ClientDependencies, CommandDependencies};
pub use components::{
    ComponentContext, ComponentError, ComponentStatus, ServiceComponent,
};
pub use config::{GlobalConfig, RootStoreConfig};
pub use dispatch::{requires_application, CommandId, Mode};
pub use error::NodeError;
pub use lifecycle::LifecycleManager;
pub use node::{NodeAddresses, NodeRuntime};
pub use wiring::{compose, ServerComponents};
