//! Durable backends for the state mapping.

use std::future::Future;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// The whole persisted state: slot name to JSON value.
pub type StateMap = serde_json::Map<String, Value>;

/// Trait for storages that keep the state mapping across restarts.
///
/// [`StateStorage::retrieve`] is called once at startup. [`StateStorage::persist`] is called
/// with the complete mapping after every mutation and must replace the previous snapshot.
pub trait StateStorage {
    /// Loads the last persisted snapshot.
    ///
    /// A missing or unreadable snapshot is a fresh start and yields an empty mapping.
    fn retrieve(&self) -> impl Future<Output = EtlResult<StateMap>> + Send;

    /// Overwrites the persisted snapshot with `state`.
    fn persist(&self, state: &StateMap) -> impl Future<Output = EtlResult<()>> + Send;
}

/// Stores the mapping as a JSON document on the local filesystem.
///
/// Writes go to a sibling `.tmp` file which is then renamed over the snapshot, so a crash
/// in the middle of a write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    async fn write_snapshot(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await
    }
}

impl StateStorage for JsonFileStorage {
    async fn retrieve(&self) -> EtlResult<StateMap> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                info!(path = %self.path.display(), "no state snapshot found, starting fresh");
                return Ok(StateMap::new());
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "state snapshot is unreadable, starting fresh"
                );
                return Ok(StateMap::new());
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(state)) => {
                info!(
                    path = %self.path.display(),
                    slots = state.len(),
                    "loaded state snapshot"
                );
                Ok(state)
            }
            Ok(other) => {
                warn!(
                    path = %self.path.display(),
                    found = %other,
                    "state snapshot is not a JSON object, starting fresh"
                );
                Ok(StateMap::new())
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "state snapshot is not valid JSON, starting fresh"
                );
                Ok(StateMap::new())
            }
        }
    }

    async fn persist(&self, state: &StateMap) -> EtlResult<()> {
        let bytes = serde_json::to_vec(state).map_err(EtlError::serialization)?;

        self.write_snapshot(&bytes).await.map_err(|err| {
            etl_error!(
                ErrorKind::StatePersistFailed,
                "State snapshot could not be written",
                self.path.display(),
                source: err
            )
        })?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "persisted state snapshot");

        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: StateMap,
    persist_count: usize,
}

/// Keeps the snapshot in memory. Useful for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage that already holds `snapshot`, as if a previous run persisted it.
    pub fn with_snapshot(snapshot: StateMap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                snapshot,
                persist_count: 0,
            })),
        }
    }

    /// Returns the last persisted snapshot.
    pub async fn snapshot(&self) -> StateMap {
        self.inner.lock().await.snapshot.clone()
    }

    /// Returns how many times [`StateStorage::persist`] succeeded.
    pub async fn persist_count(&self) -> usize {
        self.inner.lock().await.persist_count
    }
}

impl StateStorage for MemoryStorage {
    async fn retrieve(&self) -> EtlResult<StateMap> {
        Ok(self.inner.lock().await.snapshot.clone())
    }

    async fn persist(&self, state: &StateMap) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.snapshot = state.clone();
        inner.persist_count += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_state() -> StateMap {
        let mut state = StateMap::new();
        state.insert("fw_modified".to_string(), json!("2021-06-16 20:14:09.221838"));
        state.insert("extracted_data".to_string(), Value::Null);
        state
    }

    #[tokio::test]
    async fn missing_file_yields_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("state.json"));

        assert!(storage.retrieve().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_yields_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{\"fw_modified\": ").unwrap();

        let storage = JsonFileStorage::new(&path);
        assert!(storage.retrieve().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_object_snapshot_yields_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"[1, 2, 3]").unwrap();

        let storage = JsonFileStorage::new(&path);
        assert!(storage.retrieve().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_creates_parent_directories_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("state.json");
        let storage = JsonFileStorage::new(&path);

        storage.persist(&sample_state()).await.unwrap();

        assert!(path.exists());
        assert!(!storage.tmp_path().exists());
        assert_eq!(storage.retrieve().await.unwrap(), sample_state());
    }

    #[tokio::test]
    async fn persist_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("state.json"));

        storage.persist(&sample_state()).await.unwrap();
        storage.persist(&StateMap::new()).await.unwrap();

        assert!(storage.retrieve().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_into_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let storage = JsonFileStorage::new(blocker.join("state.json"));
        let err = storage.persist(&sample_state()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StatePersistFailed);
    }

    #[tokio::test]
    async fn memory_storage_counts_persists() {
        let storage = MemoryStorage::new();
        storage.persist(&sample_state()).await.unwrap();

        assert_eq!(storage.persist_count().await, 1);
        assert_eq!(storage.snapshot().await, sample_state());
    }
}
