use serde::{Deserialize, Serialize};

use crate::shared::{
    ElasticsearchConfig, PgConnectionConfig, PgConnectionConfigWithoutSecrets, PipelineConfig,
    ValidationError,
};

/// Complete configuration for the replicator service.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatorConfig {
    /// Source database holding the film catalogue.
    pub source: PgConnectionConfig,
    /// Search index receiving the documents.
    pub destination: ElasticsearchConfig,
    /// Stage tuning and state location.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ReplicatorConfig {
    /// Validates the complete replicator configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;
        self.destination.validate()
    }
}

/// Same as [`ReplicatorConfig`] but without secrets, safe to log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatorConfigWithoutSecrets {
    pub source: PgConnectionConfigWithoutSecrets,
    pub destination: ElasticsearchConfig,
    pub pipeline: PipelineConfig,
}

impl From<ReplicatorConfig> for ReplicatorConfigWithoutSecrets {
    fn from(value: ReplicatorConfig) -> Self {
        ReplicatorConfigWithoutSecrets {
            source: value.source.into(),
            destination: value.destination,
            pipeline: value.pipeline,
        }
    }
}
