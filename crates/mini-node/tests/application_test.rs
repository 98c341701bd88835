//! # Application Builder Integration Tests
//!
//! Store availability, state loading and close semantics, using stores
//! supplied through the caller registry.

mod common;

use std::path::Path;
use std::sync::Arc;

use mini_inject::ProviderRegistry;
use mini_node::config::{PruningOption, RootStoreConfig};
use mini_node::runtime::store::{
    ChangeSet, CommitInfo, RootStore, StoreBuilder, StoreError, VersionedStore,
};
use mini_node::{Application, NodeError};
use serde_json::{json, Value};

fn no_pruning() -> PruningOption {
    PruningOption {
        keep_recent: 0,
        interval: 0,
    }
}

/// Caller registry supplying the config and a store builder.
fn caller(home: &Path, builder: StoreBuilder) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry
        .supply(common::config(home, &[]))
        .supply(builder);
    registry
}

fn store_config(home: &Path) -> RootStoreConfig {
    RootStoreConfig::new(home.to_path_buf(), "memdb", no_pruning())
}

/// Store whose close always reports a failure after closing.
struct FailingClose {
    inner: VersionedStore,
}

impl RootStore for FailingClose {
    fn backend(&self) -> &str {
        "failing"
    }

    fn latest_version(&self) -> u64 {
        self.inner.latest_version()
    }

    fn get(&self, version: Option<u64>, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(version, key)
    }

    fn commit(&self, changes: &ChangeSet) -> Result<CommitInfo, StoreError> {
        self.inner.commit(changes)
    }

    fn versions(&self) -> Vec<u64> {
        self.inner.versions()
    }

    fn last_commit(&self) -> Option<CommitInfo> {
        self.inner.last_commit()
    }

    fn close(&self) -> Result<(), StoreError> {
        self.inner.close()?;
        Err(StoreError::Corrupt("flush failed".to_string()))
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[test]
fn test_builder_without_store_is_unavailable() {
    let home = tempfile::tempdir().expect("tempdir");
    let builder = StoreBuilder::with_opener(store_config(home.path()), |_| Ok(None));

    let err = Application::new(&caller(home.path(), builder), &[]).unwrap_err();

    assert!(matches!(err, NodeError::StoreUnavailable { .. }), "{err}");
}

#[test]
fn test_open_failure_is_unavailable() {
    let home = tempfile::tempdir().expect("tempdir");
    let builder = StoreBuilder::with_opener(store_config(home.path()), |_| {
        Err(StoreError::Locked(std::path::PathBuf::from("/data")))
    });

    let err = Application::new(&caller(home.path(), builder), &[]).unwrap_err();

    assert!(matches!(err, NodeError::StoreUnavailable { .. }), "{err}");
}

#[test]
fn test_load_failure_closes_store() {
    // Arrange: a committed version that lacks every module's state
    let home = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(VersionedStore::in_memory(no_pruning()));
    let mut changes = ChangeSet::new();
    changes.set("unrelated", json!(true));
    store.commit(&changes).expect("commit");

    let opened = Arc::clone(&store);
    let builder = StoreBuilder::with_opener(store_config(home.path()), move |_| {
        Ok(Some(Arc::clone(&opened) as Arc<dyn RootStore>))
    });

    // Act
    let err = Application::new(&caller(home.path(), builder), &[]).unwrap_err();

    // Assert
    assert!(matches!(err, NodeError::LoadLatestFailed { .. }), "{err}");
    assert!(store.is_closed());
}

#[test]
fn test_reopen_loads_committed_genesis() {
    let home = tempfile::tempdir().expect("tempdir");
    let config = common::config(home.path(), &[]);
    let mut registry = ProviderRegistry::new();
    registry.supply(config);

    let (app, _) = Application::new(&registry, &[]).expect("first build");
    let genesis = app.module_manager().default_genesis();
    app.app_manager().init_genesis(&genesis).expect("genesis");
    app.close().expect("close");

    let (app, _) = Application::new(&registry, &[]).expect("second build");
    assert_eq!(app.store().latest_version(), 1);
    let params = app
        .query("/mini.mint.v1.Query/Params", &Value::Null)
        .expect("query");
    assert_eq!(params["mint_denom"], "mini");
    app.close().expect("close");
}

#[test]
fn test_close_attempts_both_and_reports_store_failure() {
    let home = tempfile::tempdir().expect("tempdir");
    let builder = StoreBuilder::with_opener(store_config(home.path()), |_| {
        Ok(Some(Arc::new(FailingClose {
            inner: VersionedStore::in_memory(no_pruning()),
        }) as Arc<dyn RootStore>))
    });
    let (app, _) = Application::new(&caller(home.path(), builder), &[]).expect("build");

    let err = app.close().unwrap_err();

    assert!(err.to_string().contains("flush failed"), "{err}");
    assert!(app.store().is_closed());
    assert!(app.app_manager().is_closed());
}
