//! [`Destination`] speaking the Elasticsearch document API over HTTP.

use config::shared::ElasticsearchConfig;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::FilmWorkDocument;

/// Upper bound on the response body quoted in rejection errors.
const MAX_ERROR_BODY_LEN: usize = 512;

/// Indexes documents with `PUT {url}/{index}/_doc/{id}`.
///
/// `PUT` with an explicit id replaces any previous version, which makes redelivery
/// harmless.
#[derive(Debug, Clone)]
pub struct ElasticsearchDestination {
    client: Client,
    base_url: Url,
    index: String,
}

impl ElasticsearchDestination {
    pub fn new(config: &ElasticsearchConfig) -> EtlResult<Self> {
        let base_url = Url::parse(&config.url).map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Invalid search index URL",
                &config.url,
                source: err
            )
        })?;

        if base_url.cannot_be_a_base() {
            bail!(
                ErrorKind::ConfigError,
                "Invalid search index URL",
                format!("`{}` cannot be used as a base URL", config.url)
            );
        }

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url,
            index: config.index.clone(),
        })
    }

    /// Returns the URL of the document stored under `id`.
    fn document_url(&self, id: &str) -> EtlResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                etl_error!(
                    ErrorKind::ConfigError,
                    "Invalid search index URL",
                    self.base_url.as_str()
                )
            })?
            .pop_if_empty()
            .extend([self.index.as_str(), "_doc", id]);

        Ok(url)
    }
}

impl Destination for ElasticsearchDestination {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn upsert_document(&self, id: &str, document: &FilmWorkDocument) -> EtlResult<()> {
        let url = self.document_url(id)?;

        let response = self.client.put(url).json(document).send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(id, status = status.as_u16(), "document indexed");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = format!(
            "status {} for document {}: {}",
            status.as_u16(),
            id,
            truncate(&body, MAX_ERROR_BODY_LEN)
        );

        let (kind, description) = classify_status(status);
        bail!(kind, description, detail = detail);
    }
}

/// Only statuses blaming the document itself are final. Anything else (overload, outages,
/// read-only blocks, bad credentials, a missing index) says nothing about the document and
/// is retried with the whole batch.
fn classify_status(status: StatusCode) -> (ErrorKind, &'static str) {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::CONFLICT
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => (
            ErrorKind::DestinationQueryFailed,
            "Search index rejected the document",
        ),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => (
            ErrorKind::DestinationConnectionFailed,
            "Search index refused the request",
        ),
        _ => (
            ErrorKind::DestinationConnectionFailed,
            "Search index is unavailable",
        ),
    }
}

fn truncate(body: &str, max_len: usize) -> &str {
    match body.char_indices().nth(max_len) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ElasticsearchConfig {
        ElasticsearchConfig {
            url: url.to_string(),
            index: "movies".to_string(),
            timeout_ms: 1000,
        }
    }

    #[test]
    fn document_url_joins_index_and_id() {
        let destination = ElasticsearchDestination::new(&config("http://127.0.0.1:9200")).unwrap();
        let url = destination.document_url("3d825f60-9fff").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9200/movies/_doc/3d825f60-9fff");
    }

    #[test]
    fn document_url_keeps_base_path_and_escapes_id() {
        let destination =
            ElasticsearchDestination::new(&config("https://search.internal/es/")).unwrap();
        let url = destination.document_url("a/b c").unwrap();
        assert_eq!(
            url.as_str(),
            "https://search.internal/es/movies/_doc/a%2Fb%20c"
        );
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let err = ElasticsearchDestination::new(&config("not a url")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn only_document_faults_are_final() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::CONFLICT,
            StatusCode::PAYLOAD_TOO_LARGE,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert_eq!(classify_status(status).0, ErrorKind::DestinationQueryFailed, "{status}");
        }

        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::MOVED_PERMANENTLY,
        ] {
            let (kind, _) = classify_status(status);
            assert_eq!(kind, ErrorKind::DestinationConnectionFailed, "{status}");
            assert!(kind.is_transient());
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 10), "short");
    }
}
