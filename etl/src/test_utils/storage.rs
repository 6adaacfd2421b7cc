use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::state::{MemoryStorage, StateMap, StateStorage};

/// [`MemoryStorage`] with a switch that makes every persist fail.
#[derive(Debug, Clone, Default)]
pub struct FaultyStorage {
    storage: MemoryStorage,
    fail_persists: Arc<AtomicBool>,
}

impl FaultyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StateMap) -> Self {
        Self {
            storage: MemoryStorage::with_snapshot(snapshot),
            fail_persists: Arc::default(),
        }
    }

    pub fn fail_persists(&self, fail: bool) {
        self.fail_persists.store(fail, Ordering::SeqCst);
    }

    /// Returns the last snapshot that was persisted successfully.
    pub async fn snapshot(&self) -> StateMap {
        self.storage.snapshot().await
    }
}

impl StateStorage for FaultyStorage {
    async fn retrieve(&self) -> EtlResult<StateMap> {
        self.storage.retrieve().await
    }

    async fn persist(&self, state: &StateMap) -> EtlResult<()> {
        if self.fail_persists.load(Ordering::SeqCst) {
            bail!(
                ErrorKind::StatePersistFailed,
                "State snapshot could not be written",
                "persist failure injected by test"
            );
        }

        self.storage.persist(state).await
    }
}
