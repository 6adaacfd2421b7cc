use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::error::{EtlError, EtlResult};
use crate::state::storage::{StateMap, StateStorage};
use crate::state::watermark::Watermark;

#[derive(Debug)]
struct Inner<S> {
    storage: S,
    data: StateMap,
}

/// Mutex-guarded view over the persisted state mapping.
///
/// Every read and write takes the same lock, and every write persists the complete mapping
/// before the lock is released. When persisting fails the in-memory mapping is restored to
/// the last persisted snapshot, so memory never runs ahead of disk.
///
/// An empty key is never stored: reads return the default and writes are ignored.
#[derive(Debug)]
pub struct State<S> {
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S> Clone for State<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> State<S>
where
    S: StateStorage,
{
    /// Loads the mapping from `storage`.
    pub async fn load(storage: S) -> EtlResult<Self> {
        let data = storage.retrieve().await?;

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { storage, data })),
        })
    }

    /// Returns the raw value stored under `key`.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        if key.is_empty() {
            return None;
        }

        self.inner.lock().await.data.get(key).cloned()
    }

    /// Returns the value stored under `key`, treating `null` like an absent slot.
    pub async fn get<T>(&self, key: &str) -> EtlResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get_value(key).await {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    pub async fn get_or<T>(&self, key: &str, default: T) -> EtlResult<T>
    where
        T: DeserializeOwned,
    {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Returns `true` when `key` holds a non-empty value.
    ///
    /// `null`, an absent slot, and empty arrays, objects or strings all count as empty.
    pub async fn has_pending(&self, key: &str) -> bool {
        self.get_value(key).await.is_some_and(|value| is_pending(&value))
    }

    /// Stores `value` under `key` and persists the mapping.
    pub async fn set<T>(&self, key: &str, value: &T) -> EtlResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.set_many(StateBatch::new().set(key, value)?).await
    }

    /// Sets `key` to `null`.
    pub async fn clear(&self, key: &str) -> EtlResult<()> {
        self.set_many(StateBatch::new().clear(key)).await
    }

    /// Stores the later of the current watermark under `key` and `candidate`.
    ///
    /// Returns the watermark that ends up stored.
    pub async fn advance_watermark(&self, key: &str, candidate: Watermark) -> EtlResult<Watermark> {
        self.set_many(StateBatch::new().advance_watermark(key, candidate))
            .await?;

        Ok(self.get(key).await?.unwrap_or(candidate))
    }

    /// Applies all updates of `batch` and persists them as one snapshot.
    pub async fn set_many(&self, batch: StateBatch) -> EtlResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        let previous = inner.data.clone();

        if let Err(err) = batch.apply(&mut inner.data) {
            inner.data = previous;
            return Err(err);
        }

        let persisted = {
            let Inner { storage, data } = &*inner;
            storage.persist(data).await
        };

        if let Err(err) = persisted {
            error!(error = %err, "failed to persist state, rolling back in-memory changes");
            inner.data = previous;
            return Err(err);
        }

        debug!(slots = inner.data.len(), "state updated");

        Ok(())
    }

    /// Returns a copy of the whole mapping.
    pub async fn snapshot(&self) -> StateMap {
        self.inner.lock().await.data.clone()
    }
}

fn is_pending(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64() != Some(0.0),
        Value::String(string) => !string.is_empty(),
        Value::Array(array) => !array.is_empty(),
        Value::Object(object) => !object.is_empty(),
    }
}

#[derive(Debug)]
enum Update {
    Set(String, Value),
    AdvanceWatermark(String, Watermark),
}

/// A group of slot updates committed together by [`State::set_many`].
///
/// Updates are applied in insertion order.
#[derive(Debug, Default)]
pub struct StateBatch {
    updates: Vec<Update>,
}

impl StateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T>(mut self, key: &str, value: &T) -> EtlResult<Self>
    where
        T: Serialize + ?Sized,
    {
        if !key.is_empty() {
            let value = serde_json::to_value(value).map_err(EtlError::serialization)?;
            self.updates.push(Update::Set(key.to_string(), value));
        }

        Ok(self)
    }

    pub fn clear(mut self, key: &str) -> Self {
        if !key.is_empty() {
            self.updates.push(Update::Set(key.to_string(), Value::Null));
        }

        self
    }

    /// Moves the watermark under `key` to `candidate` unless it is already later.
    pub fn advance_watermark(mut self, key: &str, candidate: Watermark) -> Self {
        if !key.is_empty() {
            self.updates
                .push(Update::AdvanceWatermark(key.to_string(), candidate));
        }

        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    fn apply(self, data: &mut StateMap) -> EtlResult<()> {
        for update in self.updates {
            match update {
                Update::Set(key, value) => {
                    data.insert(key, value);
                }
                Update::AdvanceWatermark(key, candidate) => {
                    let current = match data.get(&key) {
                        None | Some(Value::Null) => None,
                        Some(value) => Some(serde_json::from_value::<Watermark>(value.clone())?),
                    };

                    let next = current.map_or(candidate, |current| current.max(candidate));
                    let next = serde_json::to_value(next).map_err(EtlError::serialization)?;
                    data.insert(key, next);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::state::keys;
    use crate::state::storage::{JsonFileStorage, MemoryStorage};
    use crate::test_utils::storage::FaultyStorage;

    fn watermark(raw: &str) -> Watermark {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn get_returns_default_for_absent_null_and_empty_key() {
        let state = State::load(MemoryStorage::new()).await.unwrap();
        state.clear(keys::EXTRACTED_DATA).await.unwrap();

        assert_eq!(state.get_or("missing", 7u32).await.unwrap(), 7);
        assert_eq!(
            state.get::<Vec<String>>(keys::EXTRACTED_DATA).await.unwrap(),
            None
        );
        assert_eq!(state.get_or("", 3u32).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn set_with_empty_key_is_a_no_op() {
        let storage = MemoryStorage::new();
        let state = State::load(storage.clone()).await.unwrap();

        state.set("", &json!("ignored")).await.unwrap();

        assert!(state.snapshot().await.is_empty());
        assert_eq!(storage.persist_count().await, 0);
    }

    #[tokio::test]
    async fn every_set_persists_the_whole_mapping() {
        let storage = MemoryStorage::new();
        let state = State::load(storage.clone()).await.unwrap();

        state.set("a", &1).await.unwrap();
        state.set("b", &vec!["x", "y"]).await.unwrap();

        let snapshot = storage.snapshot().await;
        assert_eq!(snapshot.get("a"), Some(&json!(1)));
        assert_eq!(snapshot.get("b"), Some(&json!(["x", "y"])));
        assert_eq!(storage.persist_count().await, 2);
    }

    #[tokio::test]
    async fn has_pending_treats_empty_containers_as_empty() {
        let state = State::load(MemoryStorage::new()).await.unwrap();

        state.set("list", &Vec::<u32>::new()).await.unwrap();
        state.set("map", &json!({})).await.unwrap();
        state.set("full", &json!({"id": 1})).await.unwrap();

        assert!(!state.has_pending("list").await);
        assert!(!state.has_pending("map").await);
        assert!(!state.has_pending("absent").await);
        assert!(state.has_pending("full").await);
    }

    #[tokio::test]
    async fn watermark_never_moves_backwards() {
        let state = State::load(MemoryStorage::new()).await.unwrap();

        let stored = state
            .advance_watermark(keys::FW_MODIFIED, watermark("2021-06-16 20:14:09"))
            .await
            .unwrap();
        assert_eq!(stored, watermark("2021-06-16 20:14:09"));

        let stored = state
            .advance_watermark(keys::FW_MODIFIED, watermark("2020-01-01 00:00:00"))
            .await
            .unwrap();
        assert_eq!(stored, watermark("2021-06-16 20:14:09"));
    }

    #[tokio::test]
    async fn watermark_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let state = State::load(JsonFileStorage::new(&path)).await.unwrap();
        state
            .advance_watermark(keys::FW_MODIFIED, watermark("2021-06-16 20:14:09.221838"))
            .await
            .unwrap();
        drop(state);

        let restarted = State::load(JsonFileStorage::new(&path)).await.unwrap();
        let stored = restarted
            .advance_watermark(keys::FW_MODIFIED, watermark("2021-01-01 00:00:00"))
            .await
            .unwrap();

        assert_eq!(stored, watermark("2021-06-16 20:14:09.221838"));
    }

    #[tokio::test]
    async fn batch_commits_all_slots_in_one_snapshot() {
        let storage = MemoryStorage::new();
        let state = State::load(storage.clone()).await.unwrap();

        let batch = StateBatch::new()
            .set(keys::EXTRACTED_DATA, &json!([{"id": "a"}]))
            .unwrap()
            .advance_watermark(keys::FW_MODIFIED, watermark("2021-06-16 20:14:09"));
        state.set_many(batch).await.unwrap();

        assert_eq!(storage.persist_count().await, 1);
        let snapshot = storage.snapshot().await;
        assert_eq!(
            snapshot.get(keys::FW_MODIFIED),
            Some(&json!("2021-06-16 20:14:09.000000"))
        );
        assert!(snapshot.get(keys::EXTRACTED_DATA).is_some());
    }

    #[tokio::test]
    async fn failed_persist_rolls_back_memory() {
        let storage = FaultyStorage::new();
        let state = State::load(storage.clone()).await.unwrap();
        state.set("kept", &1).await.unwrap();

        storage.fail_persists(true);
        let err = state.set("lost", &2).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StatePersistFailed);
        assert_eq!(state.get::<u32>("lost").await.unwrap(), None);
        assert_eq!(state.get::<u32>("kept").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn corrupt_watermark_is_rejected_without_partial_writes() {
        let mut snapshot = StateMap::new();
        snapshot.insert(keys::FW_MODIFIED.to_string(), json!("not a date"));
        let state = State::load(MemoryStorage::with_snapshot(snapshot)).await.unwrap();

        let batch = StateBatch::new()
            .set(keys::EXTRACTED_DATA, &json!([1]))
            .unwrap()
            .advance_watermark(keys::FW_MODIFIED, Watermark::now());
        assert!(state.set_many(batch).await.is_err());

        assert!(!state.has_pending(keys::EXTRACTED_DATA).await);
    }

    #[tokio::test]
    async fn unencodable_value_is_a_serialization_error() {
        let storage = MemoryStorage::new();
        let state = State::load(storage.clone()).await.unwrap();
        // JSON object keys must be strings.
        let value = std::collections::HashMap::from([((1u8, 2u8), 3u8)]);

        let err = state.set("pairs", &value).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SerializationError);
        assert_eq!(storage.persist_count().await, 0);
        assert!(!state.has_pending("pairs").await);
    }
}
