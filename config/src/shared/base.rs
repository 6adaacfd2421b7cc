use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Extract chunk size cannot be zero.
    #[error("`chunk_size` cannot be zero")]
    ChunkSizeZero,
    /// Poll interval cannot be zero.
    #[error("`poll_interval_ms` cannot be zero")]
    PollIntervalZero,
    /// Invalid backoff configuration.
    #[error("Invalid backoff config: {0}")]
    BackoffConfig(String),
    /// Invalid destination configuration.
    #[error("Invalid destination config: {0}")]
    DestinationConfig(String),
    /// The state file path is empty.
    #[error("`state_path` cannot be empty")]
    StatePathEmpty,
}
