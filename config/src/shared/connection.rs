use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tokio_postgres::Config as TokioPgConnectOptions;


const COMMON_DATESTYLE: &str = "ISO";
const COMMON_CLIENT_ENCODING: &str = "UTF8";
const COMMON_TIMEZONE: &str = "UTC";

const APP_NAME_SOURCE: &str = "postgres_to_es_extract";

/// Session options for the extract connection.
///
/// The timezone is pinned to UTC so that `modified` watermarks compare the same
/// way regardless of the server default.
pub static SOURCE_CONNECTION_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        datestyle: COMMON_DATESTYLE.to_string(),
        client_encoding: COMMON_CLIENT_ENCODING.to_string(),
        timezone: COMMON_TIMEZONE.to_string(),
        statement_timeout: 30_000,
        application_name: APP_NAME_SOURCE.to_string(),
    });

#[derive(Debug, Clone)]
pub struct PgConnectionOptions {
    pub datestyle: String,
    pub client_encoding: String,
    pub timezone: String,
    pub statement_timeout: u32,
    pub application_name: String,
}

impl PgConnectionOptions {
    pub fn to_options_string(&self) -> String {
        format!(
            "-c datestyle={} -c client_encoding={} -c timezone={} -c statement_timeout={}",
            self.datestyle, self.client_encoding, self.timezone, self.statement_timeout,
        )
    }
}

/// Connection settings for the source Postgres database.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
    pub password: Option<Secret<String>>,
}

impl PgConnectionConfig {
    /// Builds a `tokio-postgres` configuration targeting the configured database.
    pub fn with_db(&self, options: Option<&PgConnectionOptions>) -> TokioPgConnectOptions {
        let mut config = TokioPgConnectOptions::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.username)
            .dbname(&self.name);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        if let Some(opts) = options {
            config.options(&opts.to_options_string());
            config.application_name(&opts.application_name);
        }

        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgConnectionConfigWithoutSecrets {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub username: String,
}

impl From<PgConnectionConfig> for PgConnectionConfigWithoutSecrets {
    fn from(value: PgConnectionConfig) -> Self {
        PgConnectionConfigWithoutSecrets {
            host: value.host,
            port: value.port,
            name: value.name,
            username: value.username,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_config() -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "movies_database".to_string(),
            username: "app".to_string(),
            password: Some(Secret::new("123qwe".to_string())),
        }
    }

    #[test]
    fn source_options_string_format() {
        assert_eq!(
            SOURCE_CONNECTION_OPTIONS.to_options_string(),
            "-c datestyle=ISO -c client_encoding=UTF8 -c timezone=UTC -c statement_timeout=30000"
        );
    }

    #[test]
    fn with_db_targets_configured_database() {
        let config = connection_config().with_db(Some(&SOURCE_CONNECTION_OPTIONS));
        assert_eq!(config.get_dbname(), Some("movies_database"));
        assert_eq!(config.get_user(), Some("app"));
        assert_eq!(config.get_ports(), &[5432]);
        assert_eq!(config.get_application_name(), Some(APP_NAME_SOURCE));
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let rendered = format!("{:?}", connection_config());
        assert!(!rendered.contains("123qwe"));
    }

    #[test]
    fn without_secrets_drops_password() {
        let plain: PgConnectionConfigWithoutSecrets = connection_config().into();
        let json = serde_json::to_string(&plain).unwrap();
        assert!(!json.contains("password"));
    }
}
