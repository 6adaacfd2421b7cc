//! Shared configuration types for the replicator.

mod backoff;
mod base;
mod connection;
mod destination;
mod pipeline;
mod replicator;

pub use backoff::BackoffConfig;
pub use base::ValidationError;
pub use connection::{
    PgConnectionConfig, PgConnectionConfigWithoutSecrets, PgConnectionOptions,
    SOURCE_CONNECTION_OPTIONS,
};
pub use destination::ElasticsearchConfig;
pub use pipeline::PipelineConfig;
pub use replicator::{ReplicatorConfig, ReplicatorConfigWithoutSecrets};
