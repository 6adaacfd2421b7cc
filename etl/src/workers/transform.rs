use std::collections::BTreeMap;
use std::sync::Arc;

use config::shared::PipelineConfig;
use tracing::{Instrument, debug, error, info};

use crate::concurrency::shutdown::{ShutdownRx, sleep_or_shutdown};
use crate::error::EtlResult;
use crate::state::{State, StateBatch, StateStorage, keys};
use crate::types::{FilmWorkDocument, FilmWorkRow};
use crate::workers::base::{WorkerHandle, WorkerType};

/// Result of a single transform iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The previous documents have not been loaded yet.
    Backpressure,
    /// No extracted batch is waiting.
    Idle,
    Transformed { documents: usize },
}

/// Turns `extracted_data` into documents keyed by film work id.
#[derive(Debug)]
pub struct TransformWorker<St> {
    config: Arc<PipelineConfig>,
    state: State<St>,
    shutdown_rx: ShutdownRx,
}

impl<St> TransformWorker<St>
where
    St: StateStorage + Send + Sync + 'static,
{
    pub fn new(config: Arc<PipelineConfig>, state: State<St>, shutdown_rx: ShutdownRx) -> Self {
        Self {
            config,
            state,
            shutdown_rx,
        }
    }

    pub fn spawn(self) -> WorkerHandle {
        let span = tracing::info_span!("transform_worker");
        let handle = tokio::spawn(self.run().instrument(span));

        WorkerHandle::new(WorkerType::Transform, handle)
    }

    pub async fn run(mut self) -> EtlResult<()> {
        info!("starting transform worker");

        while !self.shutdown_rx.is_shutdown() {
            match self.run_once().await {
                Ok(outcome) => debug!(?outcome, "transform iteration finished"),
                Err(err) => {
                    error!(error = %err, "transform worker failed");
                    return Err(err);
                }
            }

            let poll_interval = self.config.poll_interval();
            if sleep_or_shutdown(&mut self.shutdown_rx, poll_interval)
                .await
                .should_shutdown()
            {
                break;
            }
        }

        info!("transform worker stopped");

        Ok(())
    }

    /// Transforms the pending extracted batch, if any.
    ///
    /// The documents are published and `extracted_data` is cleared in one persisted
    /// snapshot, so a crash never loses or repeats the batch.
    pub async fn run_once(&self) -> EtlResult<TransformOutcome> {
        if self.state.has_pending(keys::TRANSFORMED_DATA).await {
            return Ok(TransformOutcome::Backpressure);
        }

        let rows = self
            .state
            .get::<Vec<FilmWorkRow>>(keys::EXTRACTED_DATA)
            .await?
            .unwrap_or_default();
        if rows.is_empty() {
            return Ok(TransformOutcome::Idle);
        }

        let received = rows.len();
        let documents = transform_rows(rows);
        let count = documents.len();

        let batch = StateBatch::new()
            .set(keys::TRANSFORMED_DATA, &documents)?
            .clear(keys::EXTRACTED_DATA);
        self.state.set_many(batch).await?;

        info!(rows = received, documents = count, "transformed extracted batch");

        Ok(TransformOutcome::Transformed { documents: count })
    }
}

/// Maps rows to documents by id. A repeated id keeps the last row.
pub fn transform_rows(rows: Vec<FilmWorkRow>) -> BTreeMap<String, FilmWorkDocument> {
    rows.into_iter()
        .map(|row| {
            let document = FilmWorkDocument::from(row);
            (document.id.clone(), document)
        })
        .collect()
}
