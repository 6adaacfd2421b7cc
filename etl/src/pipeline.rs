use std::sync::Arc;

use config::shared::PipelineConfig;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::Source;
use crate::state::{State, StateStorage};
use crate::workers::base::WorkerHandle;
use crate::workers::extract::ExtractWorker;
use crate::workers::load::LoadWorker;
use crate::workers::transform::TransformWorker;

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started { workers: Vec<WorkerHandle> },
}

/// Runs the extract, transform and load workers over one shared state.
///
/// The workers only communicate through the state slots, so the pipeline's job is
/// limited to loading the state, spawning the workers, and propagating shutdown.
#[derive(Debug)]
pub struct Pipeline<Src, St, D> {
    config: Arc<PipelineConfig>,
    source: Src,
    storage: St,
    destination: D,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<Src, St, D> Pipeline<Src, St, D>
where
    Src: Source + Clone + Send + Sync + 'static,
    St: StateStorage + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    pub fn new(config: PipelineConfig, source: Src, storage: St, destination: D) -> Self {
        // Workers subscribe through `shutdown_tx`, so the initial receiver is not kept.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            source,
            storage,
            destination,
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Loads the persisted state and spawns the workers.
    pub async fn start(&mut self) -> EtlResult<()> {
        if let PipelineState::Started { .. } = self.state {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline already started",
                "start was called on a running pipeline"
            );
        }

        info!(
            destination = D::name(),
            chunk_size = self.config.chunk_size,
            poll_interval_ms = self.config.poll_interval_ms,
            "starting pipeline"
        );

        let state = State::load(self.storage.clone()).await?;

        let extract = ExtractWorker::new(
            self.config.clone(),
            self.source.clone(),
            state.clone(),
            self.shutdown_tx.subscribe(),
        )
        .spawn();
        let transform = TransformWorker::new(
            self.config.clone(),
            state.clone(),
            self.shutdown_tx.subscribe(),
        )
        .spawn();
        let load = LoadWorker::new(
            self.config.clone(),
            self.destination.clone(),
            state,
            self.shutdown_tx.subscribe(),
        )
        .spawn();

        self.state = PipelineState::Started {
            workers: vec![extract, transform, load],
        };

        Ok(())
    }

    /// Waits for every worker to stop.
    ///
    /// The first worker failure shuts the others down, since no stage can make progress
    /// for long without the rest. All failures are returned together.
    pub async fn wait(self) -> EtlResult<()> {
        let PipelineState::Started { workers } = self.state else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        info!("waiting for workers to complete");

        let mut join_set = JoinSet::new();
        for worker in workers {
            let worker_type = worker.worker_type();
            join_set.spawn(async move { (worker_type, worker.wait().await) });
        }

        let mut errors = vec![];
        while let Some(joined) = join_set.join_next().await {
            let (worker_type, result) = match joined {
                Ok(joined) => joined,
                Err(err) => {
                    errors.push(etl_error!(
                        ErrorKind::Unknown,
                        "Worker supervision task failed",
                        err
                    ));
                    continue;
                }
            };

            match result {
                Ok(()) => info!(worker = %worker_type, "worker completed"),
                Err(err) => {
                    error!(worker = %worker_type, error = %err, "worker failed, shutting down the pipeline");
                    self.shutdown_tx.shutdown();
                    errors.push(err);
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("pipeline stopped");

        Ok(())
    }

    /// Asks every worker to stop after its current iteration.
    pub fn shutdown(&self) {
        info!("shutting down the pipeline");
        self.shutdown_tx.shutdown();
    }

    pub async fn shutdown_and_wait(self) -> EtlResult<()> {
        self.shutdown();
        self.wait().await
    }
}
