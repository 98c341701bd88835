//! # Mini Inject
//!
//! Type-directed dependency resolution for the node runtime.
//!
//! ## Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ProviderRegistry                         │
//! │  providers:  id, [inputs] ──► [outputs]                      │
//! │  invokers:   id, [inputs] ──► side effect                    │
//! │  supplies:   concrete values (zero-input leaves)             │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ resolve(&[TypeKey])
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ plan:    duplicates ─► cycles ─► missing ─► post-order       │
//! │ execute: providers once each, invokers as inputs arrive      │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//!                         ResolvedValues
//! ```
//!
//! Structural errors are reported before any provider runs. A resolution
//! never caches across calls: resolving the same registry twice invokes the
//! providers twice and yields value-equal results.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mini_inject::{provide0, provide1, ProviderRegistry, TypeKey};
//!
//! let mut registry = ProviderRegistry::new();
//! registry
//!     .provide(provide0("config", || Ok(StoreConfig::default())))
//!     .provide(provide1("store", |c: &StoreConfig| Store::open(c)));
//!
//! let resolved = registry.resolve(&[TypeKey::of::<Store>()])?;
//! let store = resolved.get::<Store>()?;
//! ```

pub mod error;
pub mod key;
pub mod provider;
pub mod registry;
pub mod resolver;

pub use error::InjectError;
pub use key::{TypeKey, Value};
pub use provider::{
    invoke1, invoke2, provide0, provide1, provide2, provide3, Inputs, Invoker, InvokerBuilder,
    Outputs, Provider, ProviderBuilder,
};
pub use registry::{configs, ProviderRegistry, Supply};
pub use resolver::{ResolvedValues, Resolver};
