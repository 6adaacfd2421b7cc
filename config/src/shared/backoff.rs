use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Capped exponential backoff applied to transient connection failures.
///
/// The delay before retry `n` (0-indexed) is `start * factor^n`, clamped to `border`.
/// Retries never stop; only the spacing between them is configured here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry, in milliseconds.
    ///
    /// Default: 100ms
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,

    /// Multiplier applied to the delay after each failed attempt.
    ///
    /// Must be >= 1.0.
    /// Default: 2.0
    #[serde(default = "default_factor")]
    pub factor: f64,

    /// Upper bound for a single delay, in milliseconds.
    ///
    /// Default: 10000ms (10 seconds)
    #[serde(default = "default_border_ms")]
    pub border_ms: u64,
}

fn default_start_ms() -> u64 {
    100
}

fn default_factor() -> f64 {
    2.0
}

fn default_border_ms() -> u64 {
    10_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            start_ms: default_start_ms(),
            factor: default_factor(),
            border_ms: default_border_ms(),
        }
    }
}

impl BackoffConfig {
    /// Returns the initial delay as a Duration.
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    /// Returns the delay ceiling as a Duration.
    pub fn border(&self) -> Duration {
        Duration::from_millis(self.border_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start_ms == 0 {
            return Err(ValidationError::BackoffConfig(
                "`start_ms` must be greater than zero".to_string(),
            ));
        }

        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(ValidationError::BackoffConfig(format!(
                "`factor` must be >= 1.0, got {}",
                self.factor
            )));
        }

        if self.border_ms < self.start_ms {
            return Err(ValidationError::BackoffConfig(format!(
                "`border_ms` ({}) must not be smaller than `start_ms` ({})",
                self.border_ms, self.start_ms
            )));
        }

        Ok(())
    }
}
