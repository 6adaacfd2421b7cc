use std::collections::BTreeMap;
use std::sync::Arc;

use config::shared::PipelineConfig;
use tracing::{Instrument, debug, error, info, warn};

use crate::concurrency::shutdown::{ShutdownRx, sleep_or_shutdown};
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::state::{State, StateStorage, keys};
use crate::types::FilmWorkDocument;
use crate::workers::base::{WorkerHandle, WorkerType};

/// Result of a single load iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No transformed batch is waiting.
    Idle,
    /// The batch was fully processed and cleared.
    ///
    /// `rejected` counts documents the destination refused as invalid; they are logged
    /// and dropped.
    Loaded { delivered: usize, rejected: usize },
    /// The destination could not be reached; the batch stays pending and is sent again
    /// in full on the next cycle.
    DestinationUnavailable,
}

/// Delivers `transformed_data` to the destination and clears it once done.
#[derive(Debug)]
pub struct LoadWorker<D, St> {
    config: Arc<PipelineConfig>,
    destination: D,
    state: State<St>,
    shutdown_rx: ShutdownRx,
}

impl<D, St> LoadWorker<D, St>
where
    D: Destination + Send + Sync + 'static,
    St: StateStorage + Send + Sync + 'static,
{
    pub fn new(
        config: Arc<PipelineConfig>,
        destination: D,
        state: State<St>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            config,
            destination,
            state,
            shutdown_rx,
        }
    }

    pub fn spawn(self) -> WorkerHandle {
        let span = tracing::info_span!("load_worker", destination = D::name());
        let handle = tokio::spawn(self.run().instrument(span));

        WorkerHandle::new(WorkerType::Load, handle)
    }

    pub async fn run(mut self) -> EtlResult<()> {
        info!("starting load worker");

        while !self.shutdown_rx.is_shutdown() {
            let delay = match self.run_once().await {
                Ok(LoadOutcome::DestinationUnavailable) => self.config.load_retry_delay(),
                Ok(outcome) => {
                    debug!(?outcome, "load iteration finished");
                    self.config.poll_interval()
                }
                Err(err) => {
                    error!(error = %err, "load worker failed");
                    return Err(err);
                }
            };

            if sleep_or_shutdown(&mut self.shutdown_rx, delay)
                .await
                .should_shutdown()
            {
                break;
            }
        }

        info!("load worker stopped");

        Ok(())
    }

    /// Upserts every pending document.
    ///
    /// Only documents the destination refuses on their own merits are skipped. Any other
    /// failure stops the cycle and leaves the batch pending: transient ones are retried
    /// after a delay, the rest end the worker. Documents
    /// already delivered in that cycle will be delivered again, which is harmless since
    /// upserts are keyed by id.
    pub async fn run_once(&self) -> EtlResult<LoadOutcome> {
        let documents = self
            .state
            .get::<BTreeMap<String, FilmWorkDocument>>(keys::TRANSFORMED_DATA)
            .await?
            .unwrap_or_default();
        if documents.is_empty() {
            return Ok(LoadOutcome::Idle);
        }

        let mut delivered = 0;
        let mut rejected = 0;
        for (id, document) in &documents {
            match self.destination.upsert_document(id, document).await {
                Ok(()) => delivered += 1,
                Err(err) if err.is_transient() => {
                    warn!(
                        error = %err,
                        delivered,
                        pending = documents.len(),
                        retry_delay_ms = self.config.load_retry_delay_ms,
                        "destination unavailable, retrying batch after delay"
                    );

                    return Ok(LoadOutcome::DestinationUnavailable);
                }
                Err(err) if err.kind() == ErrorKind::DestinationQueryFailed => {
                    error!(id = %id, error = %err, "destination rejected document, skipping it");
                    rejected += 1;
                }
                Err(err) => return Err(err),
            }
        }

        self.state.clear(keys::TRANSFORMED_DATA).await?;

        info!(delivered, rejected, "loaded transformed batch");

        Ok(LoadOutcome::Loaded {
            delivered,
            rejected,
        })
    }
}
