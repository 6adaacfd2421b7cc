use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::shared::{BackoffConfig, ValidationError};

/// Tuning for the extract, transform and load loops.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Location of the JSON state snapshot shared by the stages.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Maximum number of rows returned by one primary-table sweep.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Sleep between two iterations of a stage, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Fixed delay before the load stage restarts a failed delivery cycle, in milliseconds.
    #[serde(default = "default_load_retry_delay_ms")]
    pub load_retry_delay_ms: u64,
    /// Backoff applied when acquiring a source connection.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state/state.json")
}

fn default_chunk_size() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_load_retry_delay_ms() -> u64 {
    1000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            chunk_size: default_chunk_size(),
            poll_interval_ms: default_poll_interval_ms(),
            load_retry_delay_ms: default_load_retry_delay_ms(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn load_retry_delay(&self) -> Duration {
        Duration::from_millis(self.load_retry_delay_ms)
    }

    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.state_path.as_os_str().is_empty() {
            return Err(ValidationError::StatePathEmpty);
        }

        if self.chunk_size == 0 {
            return Err(ValidationError::ChunkSizeZero);
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::PollIntervalZero);
        }

        self.backoff.validate()
    }
}
