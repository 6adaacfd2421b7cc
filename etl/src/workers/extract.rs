use std::sync::Arc;

use config::shared::PipelineConfig;
use tracing::{Instrument, debug, error, info};

use crate::backoff::Backoff;
use crate::concurrency::shutdown::{ShutdownRx, sleep_or_shutdown};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::source::{Source, SourceClient};
use crate::state::{State, StateBatch, StateStorage, Watermark, keys};
use crate::types::{FilmWorkRow, SourceRow};
use crate::workers::base::{WorkerHandle, WorkerType};

/// Result of a single extract iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// A batch is still waiting in `extracted_data`, the source was not queried.
    Backpressure,
    /// Film works linked to modified genres or persons were published.
    DependencySweep { rows: usize },
    /// Film works modified after `fw_modified` were published.
    PrimarySweep { rows: usize },
    /// Neither sweep found anything.
    Idle,
    /// A sweep query failed; nothing was published or advanced.
    SourceFailed,
}

/// Polls the source for changed film works and publishes them as `extracted_data`.
///
/// Each iteration opens its own connection and drops it before idling. The dependency
/// sweep takes precedence: the primary sweep only runs when no genre or person changed
/// since `timestamp`, so at most one watermark moves per iteration.
#[derive(Debug)]
pub struct ExtractWorker<Src, St> {
    config: Arc<PipelineConfig>,
    source: Src,
    state: State<St>,
    backoff: Backoff,
    shutdown_rx: ShutdownRx,
}

impl<Src, St> ExtractWorker<Src, St>
where
    Src: Source + Send + Sync + 'static,
    St: StateStorage + Send + Sync + 'static,
{
    pub fn new(
        config: Arc<PipelineConfig>,
        source: Src,
        state: State<St>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        let backoff = Backoff::new(&config.backoff).with_shutdown(shutdown_rx.clone());

        Self {
            config,
            source,
            state,
            backoff,
            shutdown_rx,
        }
    }

    pub fn spawn(self) -> WorkerHandle {
        let span = tracing::info_span!(
            "extract_worker",
            chunk_size = self.config.chunk_size,
            poll_interval_ms = self.config.poll_interval_ms
        );
        let handle = tokio::spawn(self.run().instrument(span));

        WorkerHandle::new(WorkerType::Extract, handle)
    }

    /// Runs iterations until shutdown is requested or an iteration fails fatally.
    pub async fn run(mut self) -> EtlResult<()> {
        info!("starting extract worker");

        while !self.shutdown_rx.is_shutdown() {
            match self.run_once().await {
                Ok(outcome) => debug!(?outcome, "extract iteration finished"),
                Err(err) if err.kind() == ErrorKind::RetryInterrupted => break,
                Err(err) => {
                    error!(error = %err, "extract worker failed");
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

        info!("extract worker stopped");

        Ok(())
    }

    /// Runs one extract iteration.
    ///
    /// Errors are fatal: state persistence failures, a non-transient connection failure,
    /// or a shutdown interrupting the connection backoff.
    pub async fn run_once(&self) -> EtlResult<ExtractOutcome> {
        if self.state.has_pending(keys::EXTRACTED_DATA).await {
            debug!("previous batch not transformed yet, skipping extraction");
            return Ok(ExtractOutcome::Backpressure);
        }

        let client = self.backoff.retry(|| self.source.connect()).await?;

        let since = self.dependency_window_start().await?;
        let sweep_started_at = Watermark::now();

        let rows = match client.dependency_changes_since(since).await {
            Ok(rows) => rows,
            Err(err) => return Ok(source_failed("dependency", err)),
        };
        if !rows.is_empty() {
            let count = rows.len();
            let batch = StateBatch::new()
                .set(keys::EXTRACTED_DATA, &strip_modified(rows))?
                .advance_watermark(keys::TIMESTAMP, sweep_started_at);
            self.state.set_many(batch).await?;

            info!(rows = count, %since, "published film works with changed genres or persons");

            return Ok(ExtractOutcome::DependencySweep { rows: count });
        }

        let fw_modified = self
            .state
            .get_or(keys::FW_MODIFIED, Watermark::initial())
            .await?;
        let rows = match client
            .modified_since(fw_modified, self.config.chunk_size)
            .await
        {
            Ok(rows) => rows,
            Err(err) => return Ok(source_failed("primary", err)),
        };
        let Some(last_modified) = rows.last().map(|row| row.modified) else {
            return Ok(ExtractOutcome::Idle);
        };

        let count = rows.len();
        let batch = StateBatch::new()
            .set(keys::EXTRACTED_DATA, &strip_modified(rows))?
            .advance_watermark(keys::FW_MODIFIED, last_modified);
        self.state.set_many(batch).await?;

        info!(rows = count, %fw_modified, %last_modified, "published modified film works");

        Ok(ExtractOutcome::PrimarySweep { rows: count })
    }

    /// Returns `timestamp`, storing the current time on first run.
    async fn dependency_window_start(&self) -> EtlResult<Watermark> {
        if let Some(timestamp) = self.state.get::<Watermark>(keys::TIMESTAMP).await? {
            return Ok(timestamp);
        }

        let now = Watermark::now();
        self.state.set(keys::TIMESTAMP, &now).await?;
        info!(timestamp = %now, "initialized dependency sweep window");

        Ok(now)
    }
}

fn strip_modified(rows: Vec<SourceRow>) -> Vec<FilmWorkRow> {
    rows.into_iter().map(SourceRow::into_row).collect()
}

fn source_failed(sweep: &'static str, err: EtlError) -> ExtractOutcome {
    error!(sweep, error = %err, "source query failed, retrying on next iteration");
    ExtractOutcome::SourceFailed
}
