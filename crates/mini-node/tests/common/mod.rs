//! Shared helpers for the node integration tests.

#![allow(dead_code)]

use std::path::Path;

use mini_node::config::{keys, ConfigOverlay, GlobalConfig};
use serde_json::Value;

/// Defaults rooted at `home`, overridden by `overrides`.
pub fn config(home: &Path, overrides: &[(&str, Value)]) -> GlobalConfig {
    let mut overlay = ConfigOverlay::with_defaults(home);
    overlay.push_layer(
        "test",
        overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<Vec<_>>(),
    );
    overlay.flatten()
}

/// A memdb node on ephemeral ports with fast blocks.
pub fn server_config(home: &Path) -> GlobalConfig {
    server_config_with(home, &[])
}

/// [`server_config`] with `extra` applied last.
pub fn server_config_with(home: &Path, extra: &[(&str, Value)]) -> GlobalConfig {
    let mut overrides = vec![
        (keys::APP_DB_BACKEND, Value::from("memdb")),
        (keys::COMET_TIMEOUT_COMMIT, Value::from("50ms")),
        (keys::SHUTDOWN_TIMEOUT, Value::from("5s")),
        (keys::GRPC_ADDRESS, Value::from("127.0.0.1:0")),
        (keys::GATEWAY_ADDRESS, Value::from("127.0.0.1:0")),
        (keys::REST_ADDRESS, Value::from("127.0.0.1:0")),
    ];
    overrides.extend(extra.iter().cloned());
    config(home, &overrides)
}
