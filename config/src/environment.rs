use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Variable selecting which settings overlay the replicator runs with.
pub const ENVIRONMENT_VARIABLE: &str = "APP_ENVIRONMENT";

/// Deployment flavour of the replicator.
///
/// Picks the settings overlay (`dev.yaml` or `prod.yaml`) and the log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown environment `{0}`, expected `dev` or `prod`")]
pub struct UnknownEnvironment(pub String);

impl Environment {
    /// Reads [`ENVIRONMENT_VARIABLE`], defaulting to [`Environment::Dev`] when unset.
    pub fn from_env() -> Result<Self, UnknownEnvironment> {
        match std::env::var(ENVIRONMENT_VARIABLE) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Stem of the overlay file under `configuration/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn is_prod(&self) -> bool {
        *self == Environment::Prod
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(UnknownEnvironment(value.to_string())),
        }
    }
}
