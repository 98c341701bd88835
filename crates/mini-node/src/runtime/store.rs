//! # Root Store
//!
//! Versioned key/value store behind the [`RootStore`] trait.
//!
//! ## Backends
//!
//! - `memdb`: in-memory, lost on exit
//! - `filedb`: JSON snapshot at `<home>/data/application.json`, guarded by an
//!   exclusive `fs2` lock on `<home>/data/LOCK` for the lifetime of the handle
//!
//! Every commit produces a new version whose hash chains the previous hash
//! with the sorted contents. Old versions are pruned per [`PruningOption`].

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{PruningOption, RootStoreConfig};

const SNAPSHOT_FILE: &str = "application.json";
const LOCK_FILE: &str = "LOCK";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown store backend {0:?}")]
    UnknownBackend(String),

    #[error("store at {0} is locked by another process")]
    Locked(PathBuf),

    #[error("version {0} not found")]
    VersionNotFound(u64),

    #[error("store is closed")]
    Closed,

    #[error("store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store snapshot: {0}")]
    Corrupt(String),
}

/// Result of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub version: u64,
    pub hash: String,
}

/// Writes applied atomically by one commit. `None` deletes the key.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    writes: BTreeMap<String, Option<Value>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.writes.insert(key.into(), Some(value));
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.writes.insert(key.into(), None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Versioned root store.
pub trait RootStore: Send + Sync {
    fn backend(&self) -> &str;

    /// Latest committed version, 0 if nothing was ever committed.
    fn latest_version(&self) -> u64;

    /// Value of `key` at `version`, or at the latest version if `None`.
    fn get(&self, version: Option<u64>, key: &str) -> Result<Option<Value>, StoreError>;

    fn commit(&self, changes: &ChangeSet) -> Result<CommitInfo, StoreError>;

    /// Retained versions, ascending.
    fn versions(&self) -> Vec<u64>;

    fn last_commit(&self) -> Option<CommitInfo>;

    fn close(&self) -> Result<(), StoreError>;

    fn is_closed(&self) -> bool;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    hash: String,
    data: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    versions: BTreeMap<u64, Snapshot>,
}

/// `memdb`/`filedb` implementation of [`RootStore`].
pub struct VersionedStore {
    backend: String,
    pruning: PruningOption,
    minimum_keep_versions: u64,
    prune_limit: u64,
    state: RwLock<StoreState>,
    dir: Option<PathBuf>,
    lock: Mutex<Option<File>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for VersionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore")
            .field("backend", &self.backend)
            .field("dir", &self.dir)
            .field("latest_version", &self.latest_version())
            .finish_non_exhaustive()
    }
}

impl VersionedStore {
    pub fn in_memory(pruning: PruningOption) -> Self {
        Self {
            backend: "memdb".to_string(),
            pruning,
            minimum_keep_versions: pruning.keep_recent,
            prune_limit: 0,
            state: RwLock::new(StoreState::default()),
            dir: None,
            lock: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Open (or create) a file-backed store in `dir`.
    pub fn open_file(dir: &Path, pruning: PruningOption) -> Result<Self, StoreError> {
        let io = |source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Io {
                path: lock_path.clone(),
                source,
            })?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(dir.to_path_buf()))?;

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let state = if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path).map_err(|source| StoreError::Io {
                path: snapshot_path.clone(),
                source,
            })?;
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(e.to_string()))?
        } else {
            StoreState::default()
        };

        info!(
            path = %dir.display(),
            latest_version = state.versions.keys().next_back().copied().unwrap_or(0),
            "opened file store"
        );

        Ok(Self {
            backend: "filedb".to_string(),
            pruning,
            minimum_keep_versions: pruning.keep_recent,
            prune_limit: 0,
            state: RwLock::new(state),
            dir: Some(dir.to_path_buf()),
            lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
        })
    }

    /// Bound the number of versions one pruning pass removes; 0 is unbounded.
    pub fn with_prune_limit(mut self, limit: u64) -> Self {
        self.prune_limit = limit;
        self
    }

    /// Pruning never removes a version newer than `latest - versions`.
    pub fn with_minimum_keep_versions(mut self, versions: u64) -> Self {
        self.minimum_keep_versions = versions;
        self
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = dir.join(SNAPSHOT_FILE);
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let bytes = serde_json::to_vec(state).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        std::fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    /// Remove stale versions, returning them so a failed commit can put
    /// them back.
    fn prune(&self, state: &mut StoreState, latest: u64) -> Vec<(u64, Snapshot)> {
        if !self.pruning.is_enabled() || latest % self.pruning.interval != 0 {
            return Vec::new();
        }
        let retained = self.pruning.keep_recent.max(self.minimum_keep_versions);
        let cutoff = latest.saturating_sub(retained);
        let mut stale: Vec<u64> = state.versions.range(..cutoff).map(|(v, _)| *v).collect();
        if self.prune_limit > 0 {
            stale.truncate(self.prune_limit as usize);
        }
        let removed: Vec<(u64, Snapshot)> = stale
            .iter()
            .filter_map(|v| state.versions.remove(v).map(|snapshot| (*v, snapshot)))
            .collect();
        if !removed.is_empty() {
            debug!(latest, cutoff, pruned = removed.len(), "pruned store versions");
        }
        removed
    }
}

fn commit_hash(previous: &str, version: u64, data: &BTreeMap<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(version.to_be_bytes());
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update(value.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl RootStore for VersionedStore {
    fn backend(&self) -> &str {
        &self.backend
    }

    fn latest_version(&self) -> u64 {
        self.state
            .read()
            .versions
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    fn get(&self, version: Option<u64>, key: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_open()?;
        let state = self.state.read();
        let snapshot = match version {
            Some(v) => state.versions.get(&v).ok_or(StoreError::VersionNotFound(v))?,
            None => match state.versions.values().next_back() {
                Some(snapshot) => snapshot,
                None => return Ok(None),
            },
        };
        Ok(snapshot.data.get(key).cloned())
    }

    fn commit(&self, changes: &ChangeSet) -> Result<CommitInfo, StoreError> {
        self.ensure_open()?;
        let mut state = self.state.write();

        let (latest, previous) = match state.versions.iter().next_back() {
            Some((v, s)) => (*v, s.clone()),
            None => (0, Snapshot::default()),
        };
        let version = latest + 1;

        let mut data = previous.data;
        for (key, write) in &changes.writes {
            match write {
                Some(value) => data.insert(key.clone(), value.clone()),
                None => data.remove(key),
            };
        }
        let hash = commit_hash(&previous.hash, version, &data);
        state.versions.insert(
            version,
            Snapshot {
                hash: hash.clone(),
                data,
            },
        );
        let pruned = self.prune(&mut state, version);
        if let Err(e) = self.persist(&state) {
            state.versions.remove(&version);
            state.versions.extend(pruned);
            return Err(e);
        }

        mini_telemetry::STORE_COMMITS.inc();
        mini_telemetry::STORE_VERSION.set(version as f64);
        Ok(CommitInfo { version, hash })
    }

    fn versions(&self) -> Vec<u64> {
        self.state.read().versions.keys().copied().collect()
    }

    fn last_commit(&self) -> Option<CommitInfo> {
        self.state
            .read()
            .versions
            .iter()
            .next_back()
            .map(|(version, snapshot)| CommitInfo {
                version: *version,
                hash: snapshot.hash.clone(),
            })
    }

    fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(lock) = self.lock.lock().take() {
            lock.unlock().map_err(|source| StoreError::Io {
                path: self.dir.clone().unwrap_or_default(),
                source,
            })?;
        }
        info!(backend = %self.backend, "store closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Open the backend named by `config.backend`.
pub fn open_store(config: &RootStoreConfig) -> Result<Arc<dyn RootStore>, StoreError> {
    let options = &config.options;
    let store = match config.backend.as_str() {
        "memdb" => VersionedStore::in_memory(options.sc_pruning),
        "filedb" => VersionedStore::open_file(&config.data_dir(), options.sc_pruning)?,
        other => return Err(StoreError::UnknownBackend(other.to_string())),
    };
    Ok(Arc::new(
        store
            .with_minimum_keep_versions(options.iavl.minimum_keep_versions)
            .with_prune_limit(options.prune_limit),
    ))
}

type StoreOpener =
    Arc<dyn Fn(&RootStoreConfig) -> Result<Option<Arc<dyn RootStore>>, StoreError> + Send + Sync>;

/// Deferred store construction.
///
/// The builder is resolved like any other value; the store is only opened
/// when the application is built, and only once.
pub struct StoreBuilder {
    config: RootStoreConfig,
    opener: StoreOpener,
    store: Mutex<Option<Arc<dyn RootStore>>>,
}

impl StoreBuilder {
    pub fn new(config: RootStoreConfig) -> Self {
        Self::with_opener(config, |config| open_store(config).map(Some))
    }

    /// Builder with a custom opener. An opener returning `Ok(None)` leaves
    /// the builder without a store.
    pub fn with_opener<F>(config: RootStoreConfig, opener: F) -> Self
    where
        F: Fn(&RootStoreConfig) -> Result<Option<Arc<dyn RootStore>>, StoreError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            config,
            opener: Arc::new(opener),
            store: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RootStoreConfig {
        &self.config
    }

    /// Open the store if it is not open yet.
    pub fn build(&self) -> Result<(), StoreError> {
        let mut slot = self.store.lock();
        if slot.is_none() {
            *slot = (self.opener)(&self.config)?;
        }
        Ok(())
    }

    pub fn get(&self) -> Option<Arc<dyn RootStore>> {
        self.store.lock().clone()
    }
}

impl std::fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("config", &self.config)
            .field("built", &self.store.lock().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pruning(keep_recent: u64, interval: u64) -> PruningOption {
        PruningOption {
            keep_recent,
            interval,
        }
    }

    fn commit_n(store: &dyn RootStore, n: u64) {
        for i in 1..=n {
            let mut changes = ChangeSet::new();
            changes.set("counter", json!(i));
            store.commit(&changes).unwrap();
        }
    }

    #[test]
    fn test_commit_versions_and_history() {
        let store = VersionedStore::in_memory(pruning(0, 0));
        commit_n(&store, 3);

        assert_eq!(store.latest_version(), 3);
        assert_eq!(store.get(None, "counter").unwrap(), Some(json!(3)));
        assert_eq!(store.get(Some(1), "counter").unwrap(), Some(json!(1)));
        assert_eq!(store.versions(), vec![1, 2, 3]);
    }

    #[test]
    fn test_pruning_keeps_recent_versions() {
        let store = VersionedStore::in_memory(pruning(2, 1));
        commit_n(&store, 5);

        assert_eq!(store.versions(), vec![3, 4, 5]);
        assert!(matches!(
            store.get(Some(1), "counter"),
            Err(StoreError::VersionNotFound(1))
        ));
    }

    #[test]
    fn test_prune_limit_bounds_one_pass() {
        let store = VersionedStore::in_memory(pruning(1, 4)).with_prune_limit(1);
        commit_n(&store, 4);
        assert_eq!(store.versions(), vec![2, 3, 4]);
    }

    #[test]
    fn test_open_store_keeps_minimum_versions() {
        // Arrange: the engine minimum exceeds keep-recent
        let mut config = RootStoreConfig::new(PathBuf::from("/unused"), "memdb", pruning(1, 1))
            .with_prune_limit(0);
        config.options.iavl.minimum_keep_versions = 3;
        let store = open_store(&config).unwrap();

        // Act
        commit_n(store.as_ref(), 5);

        // Assert
        assert_eq!(store.versions(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_open_store_prunes_one_version_per_pass_by_default() {
        let config = RootStoreConfig::new(PathBuf::from("/unused"), "memdb", pruning(1, 4));
        let store = open_store(&config).unwrap();

        commit_n(store.as_ref(), 4);

        // Versions 1 and 2 are stale; one pass removes only the oldest
        assert_eq!(store.versions(), vec![2, 3, 4]);
    }

    #[test]
    fn test_failed_persist_leaves_state_unchanged() {
        // Arrange: one durable commit, then block the snapshot write
        let dir = tempfile::tempdir().unwrap();
        let store = VersionedStore::open_file(dir.path(), pruning(1, 1)).unwrap();
        commit_n(&store, 2);
        let before = store.last_commit().unwrap();
        std::fs::create_dir(dir.path().join(format!("{SNAPSHOT_FILE}.tmp"))).unwrap();

        // Act
        let mut changes = ChangeSet::new();
        changes.set("counter", json!(99));
        let result = store.commit(&changes);

        // Assert: neither the new version nor the pruned one changed
        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert_eq!(store.latest_version(), 2);
        assert_eq!(store.versions(), vec![1, 2]);
        assert_eq!(store.last_commit().unwrap(), before);
        assert_eq!(store.get(None, "counter").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_hash_changes_per_commit() {
        let store = VersionedStore::in_memory(pruning(0, 0));
        commit_n(&store, 1);
        let first = store.last_commit().unwrap();
        commit_n(&store, 1);
        let second = store.last_commit().unwrap();
        assert_ne!(first.hash, second.hash);
        assert_eq!(second.version, 2);
    }

    #[test]
    fn test_file_store_persists_and_locks() {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionedStore::open_file(dir.path(), pruning(0, 0)).unwrap();
        commit_n(&store, 2);

        assert!(matches!(
            VersionedStore::open_file(dir.path(), pruning(0, 0)),
            Err(StoreError::Locked(_))
        ));

        store.close().unwrap();
        let reopened = VersionedStore::open_file(dir.path(), pruning(0, 0)).unwrap();
        assert_eq!(reopened.latest_version(), 2);
        assert_eq!(reopened.get(None, "counter").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_closed_store_rejects_access() {
        let store = VersionedStore::in_memory(pruning(0, 0));
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.get(None, "x"), Err(StoreError::Closed)));
        assert!(matches!(store.commit(&ChangeSet::new()), Err(StoreError::Closed)));
    }

    #[test]
    fn test_builder_opens_once() {
        let config = RootStoreConfig::new(PathBuf::from("/unused"), "memdb", pruning(0, 0));
        let builder = StoreBuilder::new(config);
        assert!(builder.get().is_none());

        builder.build().unwrap();
        let first = builder.get().unwrap();
        builder.build().unwrap();
        assert!(Arc::ptr_eq(&first, &builder.get().unwrap()));
    }

    #[test]
    fn test_unknown_backend() {
        let config = RootStoreConfig::new(PathBuf::from("/unused"), "rocks", pruning(0, 0));
        assert!(matches!(
            StoreBuilder::new(config).build(),
            Err(StoreError::UnknownBackend(_))
        ));
    }
}
