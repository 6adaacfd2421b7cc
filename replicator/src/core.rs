use config::shared::{ReplicatorConfig, ReplicatorConfigWithoutSecrets};
use etl::destination::Destination;
use etl::destination::elasticsearch::ElasticsearchDestination;
use etl::pipeline::Pipeline;
use etl::source::Source;
use etl::source::postgres::PgSource;
use etl::state::{JsonFileStorage, StateStorage};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::error::ReplicatorResult;

/// Builds the Postgres to Elasticsearch pipeline and runs it until shutdown.
pub async fn start_replicator_with_config(
    replicator_config: ReplicatorConfig,
) -> ReplicatorResult<()> {
    info!(
        config = ?ReplicatorConfigWithoutSecrets::from(replicator_config.clone()),
        "starting replicator"
    );

    let source = PgSource::new(replicator_config.source);
    let destination = ElasticsearchDestination::new(&replicator_config.destination)?;
    let storage = JsonFileStorage::new(&replicator_config.pipeline.state_path);

    let pipeline = Pipeline::new(replicator_config.pipeline, source, storage, destination);
    start_pipeline(pipeline).await
}

/// Starts the pipeline and shuts it down on SIGINT or SIGTERM.
///
/// Every state change is already persisted when it happens, so shutdown only has to
/// stop the workers after their current iteration.
#[tracing::instrument(skip(pipeline))]
async fn start_pipeline<Src, St, D>(mut pipeline: Pipeline<Src, St, D>) -> ReplicatorResult<()>
where
    Src: Source + Clone + Send + Sync + 'static,
    St: StateStorage + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    pipeline.start().await?;

    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("sigint (ctrl+c) received, shutting down pipeline");
                    }
                    _ = sigterm.recv() => {
                        info!("sigterm received, shutting down pipeline");
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to register sigterm handler, listening for ctrl+c only");
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "failed to listen for ctrl+c");
                    return;
                }
                info!("sigint (ctrl+c) received, shutting down pipeline");
            }
        }

        shutdown_tx.shutdown();
    });

    let result = pipeline.wait().await;

    // The pipeline may stop on its own after a failure, in which case no signal ever came.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    info!("replicator stopped");

    Ok(())
}
