//! Node-level errors.
//!
//! Resolution, application build and composition errors are fatal to the
//! bootstrap. Stop errors are collected and surfaced after every component
//! has been given the chance to stop.

use thiserror::Error;

use crate::components::ComponentError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("dependency resolution failed: {0}")]
    Resolve(#[from] mini_inject::InjectError),

    #[error("store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("failed to load latest state: {reason}")]
    LoadLatestFailed { reason: String },

    #[error("failed to construct {component} component: {source:#}")]
    ComponentConstructionFailed {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("component init failed: {0}")]
    ComponentInitFailed(ComponentError),

    #[error("component start failed: {source}{}", format_rollback(.rollback))]
    ComponentStartFailed {
        source: ComponentError,
        /// Errors from stopping the components started before the failure
        rollback: Vec<ComponentError>,
    },

    #[error("component stop failed: {}", join_errors(.0))]
    ComponentStopFailed(Vec<ComponentError>),

    #[error("failed to close application: {reason}")]
    CloseFailed { reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[ComponentError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_rollback(rollback: &[ComponentError]) -> String {
    if rollback.is_empty() {
        String::new()
    } else {
        format!(" (rollback errors: {})", join_errors(rollback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_errors_are_joined() {
        let err = NodeError::ComponentStopFailed(vec![
            ComponentError::new("rest", "listener stuck"),
            ComponentError::new("store", "flush failed"),
        ]);
        assert_eq!(
            err.to_string(),
            "component stop failed: [rest] listener stuck; [store] flush failed"
        );
    }

    #[test]
    fn test_start_failure_mentions_rollback() {
        let err = NodeError::ComponentStartFailed {
            source: ComponentError::new("grpc", "address in use"),
            rollback: vec![ComponentError::new("store", "busy")],
        };
        let text = err.to_string();
        assert!(text.starts_with("component start failed: [grpc] address in use"));
        assert!(text.contains("rollback errors: [store] busy"));
    }
}
