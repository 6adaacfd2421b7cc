//! Layered loading of the replicator settings.
//!
//! Layers are merged in order, later ones winning:
//!
//! 1. `configuration/base.yaml`
//! 2. `configuration/<APP_ENVIRONMENT>.yaml`
//! 3. `APP_<SECTION>__<KEY>` variables, e.g. `APP_SOURCE__PASSWORD` or
//!    `APP_PIPELINE__BACKOFF__BORDER_MS`.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::{Environment, UnknownEnvironment};

/// Directory holding the settings files, relative to the working directory.
pub const CONFIGURATION_DIR: &str = "configuration";

const VARIABLE_PREFIX: &str = "APP";
const SECTION_SEPARATOR: &str = "__";

/// One of the merged settings layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Base,
    Overlay(Environment),
    Variables,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Base => f.write_str("base settings"),
            Layer::Overlay(environment) => write!(f, "{environment} settings"),
            Layer::Variables => write!(f, "{VARIABLE_PREFIX}_ variables"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to resolve the working directory: {0}")]
    WorkingDirectory(#[source] io::Error),

    #[error(transparent)]
    Environment(#[from] UnknownEnvironment),

    #[error("settings file `{0}` does not exist")]
    MissingFile(PathBuf),

    #[error("{layer} could not be read: {source}")]
    Layer {
        layer: Layer,
        #[source]
        source: rust_cli_config::ConfigError,
    },

    #[error("settings do not form a valid replicator configuration: {0}")]
    Shape(#[source] rust_cli_config::ConfigError),
}

/// Loads settings from `./configuration` for the environment named by `APP_ENVIRONMENT`.
pub fn load_config<T: DeserializeOwned>() -> Result<T, LoadConfigError> {
    let root = std::env::current_dir().map_err(LoadConfigError::WorkingDirectory)?;

    load_config_from(&root.join(CONFIGURATION_DIR), Environment::from_env()?)
}

/// Loads settings from `directory` using the overlay of `environment`.
pub fn load_config_from<T: DeserializeOwned>(
    directory: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError> {
    merge_layers(directory, environment, variables())
}

fn variables() -> rust_cli_config::Environment {
    rust_cli_config::Environment::with_prefix(VARIABLE_PREFIX)
        .prefix_separator("_")
        .separator(SECTION_SEPARATOR)
        .try_parsing(true)
}

fn merge_layers<T: DeserializeOwned>(
    directory: &Path,
    environment: Environment,
    variables: rust_cli_config::Environment,
) -> Result<T, LoadConfigError> {
    let mut builder = rust_cli_config::Config::builder();

    for (layer, stem) in [
        (Layer::Base, "base"),
        (Layer::Overlay(environment), environment.as_str()),
    ] {
        let path = directory.join(format!("{stem}.yaml"));
        if !path.is_file() {
            return Err(LoadConfigError::MissingFile(path));
        }

        builder = builder.add_source(rust_cli_config::File::from(path));
        // A broken file is reported against its own layer rather than the merged result.
        check_layer(&builder, layer)?;
    }

    let settings = builder
        .add_source(variables)
        .build()
        .map_err(|source| LoadConfigError::Layer {
            layer: Layer::Variables,
            source,
        })?;

    settings.try_deserialize().map_err(LoadConfigError::Shape)
}

fn check_layer(builder: &ConfigBuilder<DefaultState>, layer: Layer) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map(|_| ())
        .map_err(|source| LoadConfigError::Layer { layer, source })
}
