//! Replicator service binary.
//!
//! Loads configuration, initializes tracing, and runs the pipeline that copies film
//! works from Postgres into Elasticsearch until SIGINT or SIGTERM.

use std::process::ExitCode;

use ::config::shared::ReplicatorConfig;
use tracing::error;

use crate::config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> ReplicatorResult<()> {
    let replicator_config = load_replicator_config()?;

    let _log_flusher =
        telemetry::init_tracing(env!("CARGO_BIN_NAME")).map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(replicator_config))
}

async fn async_main(replicator_config: ReplicatorConfig) -> ReplicatorResult<()> {
    if let Err(err) = start_replicator_with_config(replicator_config).await {
        error!(category = err.category(), "{err}");
        return Err(err);
    }

    Ok(())
}
