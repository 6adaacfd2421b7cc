use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::destination::{Destination, MemoryDestination};
use crate::error::{ErrorKind, EtlResult};
use crate::test_utils::notify::TimedNotify;
use crate::types::FilmWorkDocument;
use crate::{bail, etl_error};

type DocumentCondition = Box<dyn Fn(&BTreeMap<String, FilmWorkDocument>) -> bool + Send + Sync>;

#[derive(Default)]
struct Inner {
    failures: VecDeque<ErrorKind>,
    outages: HashMap<String, usize>,
    rejected_ids: HashSet<String>,
    attempts: Vec<String>,
    document_conditions: Vec<(DocumentCondition, Arc<Notify>)>,
}

/// [`MemoryDestination`] wrapper that fails or rejects deliveries on demand.
///
/// Scripted failures are consumed one per upsert call before the document reaches the
/// wrapped destination. Documents whose id is rejected always fail with
/// [`ErrorKind::DestinationQueryFailed`], mirroring an index that refuses them.
#[derive(Clone, Default)]
pub struct FlakyDestination {
    destination: MemoryDestination,
    inner: Arc<Mutex<Inner>>,
}

impl FlakyDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` upserts fail as if the index were unreachable.
    pub async fn fail_next(&self, count: usize) {
        self.fail_next_with(ErrorKind::DestinationConnectionFailed, count)
            .await;
    }

    pub async fn fail_next_with(&self, kind: ErrorKind, count: usize) {
        let mut inner = self.inner.lock().await;
        inner.failures.extend(std::iter::repeat_n(kind, count));
    }

    /// Makes the next `count` upserts of `id` fail as if the index were unreachable.
    pub async fn outage_on(&self, id: &str, count: usize) {
        *self
            .inner
            .lock()
            .await
            .outages
            .entry(id.to_string())
            .or_default() += count;
    }

    /// Permanently rejects the document stored under `id`.
    pub async fn reject_id(&self, id: &str) {
        self.inner.lock().await.rejected_ids.insert(id.to_string());
    }

    /// Returns the id of every upsert attempt, failed ones included.
    pub async fn attempts(&self) -> Vec<String> {
        self.inner.lock().await.attempts.clone()
    }

    pub async fn documents(&self) -> BTreeMap<String, FilmWorkDocument> {
        self.destination.documents().await
    }

    /// Returns the number of successful upserts, including redeliveries.
    pub async fn upserts(&self) -> usize {
        self.destination.upserts().await
    }

    /// Returns a notification fired once at least `count` distinct documents are stored.
    pub async fn wait_for_documents(&self, count: usize) -> TimedNotify {
        self.notify_on_documents(move |documents| documents.len() >= count)
            .await
    }

    /// Returns a notification fired once the stored documents satisfy `condition`.
    pub async fn notify_on_documents<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&BTreeMap<String, FilmWorkDocument>) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());

        // The condition may already hold, in which case no later upsert would fire it.
        let documents = self.destination.documents().await;
        if condition(&documents) {
            notify.notify_one();
        } else {
            self.inner
                .lock()
                .await
                .document_conditions
                .push((Box::new(condition), notify.clone()));
        }

        TimedNotify::new(notify)
    }
}

impl Destination for FlakyDestination {
    fn name() -> &'static str {
        "flaky"
    }

    async fn upsert_document(&self, id: &str, document: &FilmWorkDocument) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.attempts.push(id.to_string());

        if let Some(kind) = inner.failures.pop_front() {
            return Err(etl_error!(
                kind,
                "Injected destination failure",
                "failure scripted by test"
            ));
        }

        if let Some(remaining) = inner.outages.get_mut(id)
            && *remaining > 0
        {
            *remaining -= 1;
            bail!(
                ErrorKind::DestinationConnectionFailed,
                "Injected destination failure",
                format!("outage scripted by test for document {id}")
            );
        }

        if inner.rejected_ids.contains(id) {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Document rejected by destination",
                format!("document {id} is rejected by test")
            );
        }

        self.destination.upsert_document(id, document).await?;

        let documents = self.destination.documents().await;
        inner.document_conditions.retain(|(condition, notify)| {
            let met = condition(&documents);
            if met {
                notify.notify_one();
            }
            !met
        });

        Ok(())
    }
}
