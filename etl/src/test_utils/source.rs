use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::source::{Source, SourceClient};
use crate::state::Watermark;
use crate::types::SourceRow;

#[derive(Debug, Default)]
struct Inner {
    film_works: Vec<SourceRow>,
    dependency_responses: VecDeque<Vec<SourceRow>>,
    connect_failures: VecDeque<ErrorKind>,
    query_failures: VecDeque<ErrorKind>,
    connect_calls: usize,
    dependency_queries: Vec<Watermark>,
    primary_queries: Vec<(Watermark, usize)>,
}

/// Scripted [`Source`] backed by an in-memory film work table.
///
/// Primary sweeps filter the table by `modified > since`, oldest first, truncated to the
/// requested limit. Dependency sweeps pop the next scripted response and return nothing
/// once the script is exhausted. Clones share the same state, so a test can keep a handle
/// for assertions after moving the source into a pipeline.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    inner: Arc<Mutex<Inner>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces film works in the table.
    pub async fn upsert_film_works(&self, rows: impl IntoIterator<Item = SourceRow>) {
        let mut inner = self.inner.lock().await;
        for row in rows {
            inner.film_works.retain(|existing| existing.row.id != row.row.id);
            inner.film_works.push(row);
        }
    }

    /// Queues the result of the next dependency sweep.
    pub async fn push_dependency_changes(&self, rows: Vec<SourceRow>) {
        self.inner.lock().await.dependency_responses.push_back(rows);
    }

    /// Makes the next `count` connection attempts fail with `kind`.
    pub async fn fail_connects(&self, kind: ErrorKind, count: usize) {
        let mut inner = self.inner.lock().await;
        inner.connect_failures.extend(std::iter::repeat_n(kind, count));
    }

    /// Makes the next `count` queries of either sweep fail with `kind`.
    pub async fn fail_queries(&self, kind: ErrorKind, count: usize) {
        let mut inner = self.inner.lock().await;
        inner.query_failures.extend(std::iter::repeat_n(kind, count));
    }

    pub async fn connect_calls(&self) -> usize {
        self.inner.lock().await.connect_calls
    }

    /// Returns the `since` argument of every dependency sweep, in call order.
    pub async fn dependency_queries(&self) -> Vec<Watermark> {
        self.inner.lock().await.dependency_queries.clone()
    }

    /// Returns the `since` and `limit` arguments of every primary sweep, in call order.
    pub async fn primary_queries(&self) -> Vec<(Watermark, usize)> {
        self.inner.lock().await.primary_queries.clone()
    }

    /// Returns the number of queries of either sweep.
    pub async fn query_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.dependency_queries.len() + inner.primary_queries.len()
    }
}

fn injected(kind: ErrorKind) -> EtlError {
    etl_error!(kind, "Injected source failure", "failure scripted by test")
}

impl Source for MockSource {
    type Client = MockSourceClient;

    async fn connect(&self) -> EtlResult<Self::Client> {
        let mut inner = self.inner.lock().await;
        inner.connect_calls += 1;

        if let Some(kind) = inner.connect_failures.pop_front() {
            return Err(injected(kind));
        }

        Ok(MockSourceClient {
            inner: self.inner.clone(),
        })
    }
}

/// Connection handed out by [`MockSource`].
#[derive(Debug, Clone)]
pub struct MockSourceClient {
    inner: Arc<Mutex<Inner>>,
}

impl SourceClient for MockSourceClient {
    async fn dependency_changes_since(&self, since: Watermark) -> EtlResult<Vec<SourceRow>> {
        let mut inner = self.inner.lock().await;
        inner.dependency_queries.push(since);

        if let Some(kind) = inner.query_failures.pop_front() {
            return Err(injected(kind));
        }

        Ok(inner.dependency_responses.pop_front().unwrap_or_default())
    }

    async fn modified_since(&self, since: Watermark, limit: usize) -> EtlResult<Vec<SourceRow>> {
        let mut inner = self.inner.lock().await;
        inner.primary_queries.push((since, limit));

        if let Some(kind) = inner.query_failures.pop_front() {
            return Err(injected(kind));
        }

        let mut rows: Vec<SourceRow> = inner
            .film_works
            .iter()
            .filter(|row| row.modified > since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.modified.cmp(&b.modified));
        rows.truncate(limit);

        Ok(rows)
    }
}
