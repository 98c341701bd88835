//! # Bootstrap
//!
//! Resolves what a command needs, in the mode the command requires.
//!
//! - **Client mode** resolves only `AutoCliOptions`, `ModuleManager` and
//!   `ClientContext`. No store builder is resolved and nothing is opened.
//! - **Server mode** builds the [`Application`] and resolves the same
//!   client-side values in the same pass.

use std::sync::Arc;

use mini_inject::{configs, ProviderRegistry, ResolvedValues, TypeKey};
use mini_telemetry::{time_histogram, BOOTSTRAP_DURATION, PROVIDER_INVOCATIONS, RESOLUTIONS};
use tracing::{debug, info};

use crate::app::{app_config, Application};
use crate::client::{client_context_provider, AutoCliOptions, ClientContext};
use crate::config::GlobalConfig;
use crate::dispatch::{mode_for, CommandId, Mode};
use crate::error::NodeError;
use crate::runtime::module::ModuleManager;

/// Values available to client-mode commands.
#[derive(Debug, Clone)]
pub struct ClientDependencies {
    pub autocli: Arc<AutoCliOptions>,
    pub module_manager: Arc<ModuleManager>,
    pub client: Arc<ClientContext>,
}

/// What [`bootstrap`] produced for a command.
#[derive(Debug)]
pub enum CommandDependencies {
    Client(ClientDependencies),
    Server {
        app: Application,
        deps: ClientDependencies,
    },
}

impl CommandDependencies {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Client(_) => Mode::Client,
            Self::Server { .. } => Mode::Server,
        }
    }

    pub fn client_deps(&self) -> &ClientDependencies {
        match self {
            Self::Client(deps) | Self::Server { deps, .. } => deps,
        }
    }
}

/// Registry the caller contributes: the global config and the client
/// context provider.
pub fn caller_registry(config: GlobalConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.supply(config).provide(client_context_provider());
    registry
}

fn client_keys() -> [TypeKey; 3] {
    [
        TypeKey::of::<AutoCliOptions>(),
        TypeKey::of::<ModuleManager>(),
        TypeKey::of::<ClientContext>(),
    ]
}

fn client_deps(resolved: &ResolvedValues) -> Result<ClientDependencies, NodeError> {
    Ok(ClientDependencies {
        autocli: resolved.get::<AutoCliOptions>()?,
        module_manager: resolved.get::<ModuleManager>()?,
        client: resolved.get::<ClientContext>()?,
    })
}

fn record(mode: Mode, resolved: Option<&ResolvedValues>) {
    let outcome = if resolved.is_some() { "ok" } else { "error" };
    RESOLUTIONS
        .with_label_values(&[mode.as_str(), outcome])
        .inc();
    if let Some(resolved) = resolved {
        PROVIDER_INVOCATIONS.inc_by(resolved.invocation_order().len() as f64);
        debug!(order = ?resolved.invocation_order(), "providers invoked");
    }
}

/// Resolve the dependencies of `command`.
pub fn bootstrap(command: &CommandId, config: GlobalConfig) -> Result<CommandDependencies, NodeError> {
    let _timer = time_histogram!(BOOTSTRAP_DURATION);
    let mode = mode_for(command);
    info!(command = %command, mode = mode.as_str(), "bootstrapping");
    let caller = caller_registry(config);

    match mode {
        Mode::Client => {
            let registry = configs([&app_config(), &caller]);
            let resolved = registry.resolve(&client_keys());
            record(mode, resolved.as_ref().ok());
            let deps = client_deps(&resolved?)?;
            Ok(CommandDependencies::Client(deps))
        }
        Mode::Server => {
            let built = Application::new(&caller, &client_keys());
            record(mode, built.as_ref().ok().map(|(_, resolved)| resolved));
            let (app, resolved) = built?;
            let deps = client_deps(&resolved)?;
            Ok(CommandDependencies::Server { app, deps })
        }
    }
}
