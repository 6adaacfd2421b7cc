//! Configuration loading and shared configuration types for the replicator.

mod environment;
mod load;
pub mod shared;

pub use environment::{ENVIRONMENT_VARIABLE, Environment, UnknownEnvironment};
pub use load::{CONFIGURATION_DIR, Layer, LoadConfigError, load_config, load_config_from};
