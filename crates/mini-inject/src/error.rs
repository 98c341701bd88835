//! Error types for provider resolution.

use thiserror::Error;

/// Errors produced while planning or executing a resolution.
///
/// Every variant is fatal to the `resolve` call that produced it; no partial
/// set of values is ever returned alongside an error.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("no provider for {type_name} (required by {required_by})")]
    MissingProvider {
        type_name: &'static str,
        required_by: String,
    },

    #[error("duplicate provider for {type_name}: {first} and {second}")]
    DuplicateProvider {
        type_name: &'static str,
        first: String,
        second: String,
    },

    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("provider {provider} failed")]
    ProviderFailed {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{type_name} is not a declared input of {provider}")]
    UndeclaredInput {
        provider: String,
        type_name: &'static str,
    },

    #[error("{type_name} was not resolved")]
    NotResolved { type_name: &'static str },
}

impl InjectError {
    /// Id of the provider or invoker that failed, if the error came from one.
    #[must_use]
    pub fn failed_provider(&self) -> Option<&str> {
        match self {
            Self::ProviderFailed { provider, .. } => Some(provider),
            _ => None,
        }
    }
}
