use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Elasticsearch-compatible index that receives the documents.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster, e.g. `http://localhost:9200`.
    pub url: String,
    /// Target index name.
    #[serde(default = "default_index")]
    pub index: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_index() -> String {
    "movies".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ElasticsearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::DestinationConfig(format!(
                "`url` must start with http:// or https://, got `{}`",
                self.url
            )));
        }

        if self.index.trim().is_empty() {
            return Err(ValidationError::DestinationConfig(
                "`index` cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_timeout_have_defaults() {
        let config: ElasticsearchConfig =
            serde_json::from_str(r#"{"url": "http://localhost:9200"}"#).unwrap();
        assert_eq!(config.index, "movies");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_url_without_scheme() {
        let config = ElasticsearchConfig {
            url: "localhost:9200".to_string(),
            index: "movies".to_string(),
            timeout_ms: 1000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_blank_index() {
        let config = ElasticsearchConfig {
            url: "https://search.internal".to_string(),
            index: "  ".to_string(),
            timeout_ms: 1000,
        };
        assert!(config.validate().is_err());
    }
}
