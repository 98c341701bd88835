//! # Bootstrap Integration Tests
//!
//! Mode dispatch end to end: client commands resolve without touching the
//! store, server commands build the application.

mod common;

use mini_inject::InjectError;
use mini_node::config::keys;
use mini_node::{bootstrap, CommandDependencies, CommandId, Mode, NodeError};
use serde_json::Value;

#[test]
fn test_client_mode_opens_no_store() {
    // Arrange: a file-backed home
    let home = tempfile::tempdir().expect("tempdir");
    let config = common::config(home.path(), &[]);

    // Act
    let deps = bootstrap(&CommandId::new(["query", "latest-block"]), config)
        .expect("client bootstrap");

    // Assert: client values resolved, no data directory created
    assert_eq!(deps.mode(), Mode::Client);
    let client = deps.client_deps();
    assert!(client.autocli.module("bank").is_some());
    assert_eq!(client.client.chain_id, "mini-1");
    assert_eq!(client.client.account_address_codec.0.prefix(), "mini");
    assert!(!home.path().join("data").exists());
}

#[test]
fn test_client_mode_registers_module_interfaces() {
    let home = tempfile::tempdir().expect("tempdir");
    let deps = bootstrap(
        &CommandId::new(["tx", "decode"]),
        common::config(home.path(), &[]),
    )
    .expect("client bootstrap");

    let registry = &deps.client_deps().client.interface_registry;
    assert!(registry.is_registered("/mini.bank.v1.MsgSend"));
    assert!(!registry.is_sealed());
}

#[test]
fn test_server_mode_builds_application() {
    let home = tempfile::tempdir().expect("tempdir");
    let config = common::config(home.path(), &[]);

    let deps = bootstrap(&CommandId::new(["genesis", "export"]), config)
        .expect("server bootstrap");

    let CommandDependencies::Server { app, deps } = deps else {
        panic!("expected server mode");
    };
    assert!(home.path().join("data").exists());
    assert!(app.interface_registry().is_sealed());
    assert_eq!(deps.client.chain_id, "mini-1");
    app.close().expect("close");
    assert!(app.store().is_closed());
}

#[test]
fn test_bad_store_config_stops_before_the_store() {
    // Arrange: keep-recent that cannot be parsed
    let home = tempfile::tempdir().expect("tempdir");
    let config = common::config(
        home.path(),
        &[(keys::SC_KEEP_RECENT, Value::from("many"))],
    );

    // Act
    let err = bootstrap(&CommandId::new(["start"]), config).unwrap_err();

    // Assert: the store config provider failed and nothing was opened
    match err {
        NodeError::Resolve(inject) => {
            assert_eq!(inject.failed_provider(), Some("app.root_store_config"));
            assert!(matches!(inject, InjectError::ProviderFailed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!home.path().join("data").exists());
}

#[test]
fn test_keep_recent_flows_into_store_config() {
    for keep_recent in [100u64, 0] {
        let home = tempfile::tempdir().expect("tempdir");
        let config = common::config(
            home.path(),
            &[
                (keys::APP_DB_BACKEND, Value::from("memdb")),
                (keys::SC_KEEP_RECENT, Value::from(keep_recent.to_string())),
            ],
        );
        let store_config = mini_node::RootStoreConfig::from_global(&config).expect("store config");
        assert_eq!(store_config.options.iavl.minimum_keep_versions, keep_recent);
        assert_eq!(store_config.options.sc_pruning.keep_recent, keep_recent);
    }
}
