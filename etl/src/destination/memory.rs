use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::destination::Destination;
use crate::error::EtlResult;
use crate::types::FilmWorkDocument;

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<String, FilmWorkDocument>,
    upserts: usize,
}

/// In-memory destination for testing and dry runs.
///
/// Keeps the latest document per id and counts every upsert, so redelivery is visible as
/// a higher [`MemoryDestination::upserts`] with an unchanged [`MemoryDestination::documents`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored documents keyed by id.
    pub async fn documents(&self) -> BTreeMap<String, FilmWorkDocument> {
        self.inner.lock().await.documents.clone()
    }

    /// Returns the number of upserts received, including redeliveries.
    pub async fn upserts(&self) -> usize {
        self.inner.lock().await.upserts
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.documents.clear();
        inner.upserts = 0;
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn upsert_document(&self, id: &str, document: &FilmWorkDocument) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        debug!(id, "storing document in memory");

        inner.documents.insert(id.to_string(), document.clone());
        inner.upserts += 1;

        Ok(())
    }
}
