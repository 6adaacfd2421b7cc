use std::path::Path;
use std::time::Duration;

use config::shared::{BackoffConfig, PipelineConfig};
use etl::state::{JsonFileStorage, StateStorage, keys};
use serde_json::Value;

mod pipeline_test;
mod restart_test;

/// Pipeline configuration with short intervals so tests finish quickly.
pub fn test_pipeline_config(state_path: &Path, chunk_size: usize) -> PipelineConfig {
    PipelineConfig {
        state_path: state_path.to_path_buf(),
        chunk_size,
        poll_interval_ms: 10,
        load_retry_delay_ms: 20,
        backoff: BackoffConfig {
            start_ms: 5,
            factor: 2.0,
            border_ms: 50,
        },
    }
}

/// Reads the state file the way a restarted pipeline would.
///
/// Missing slots index as `null`.
pub async fn read_state(path: &Path) -> Value {
    Value::Object(JsonFileStorage::new(path).retrieve().await.unwrap())
}

/// Waits until the load worker has cleared the batch it delivered.
///
/// # Panics
///
/// Panics if `transformed_data` is still pending after ten seconds.
pub async fn wait_for_drained_batch(path: &Path) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !read_state(path).await[keys::TRANSFORMED_DATA].is_null() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "transformed batch was not drained within ten seconds"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
