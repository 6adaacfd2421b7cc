//! [`Source`] backed by the `content` schema of the movies database.

use chrono::{DateTime, Utc};
use config::shared::{PgConnectionConfig, SOURCE_CONNECTION_OPTIONS};
use tokio_postgres::types::Json;
use tokio_postgres::{Client, Connection, NoTls, Row, Socket};
use tracing::{Instrument, debug, error, info};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{Source, SourceClient};
use crate::state::Watermark;
use crate::types::{FilmWorkRow, PersonRef, SourceRow};

/// Builds the film work query around a `WHERE` clause and a trailing clause.
///
/// Aggregates use `FILTER` so a film work without genres or people gets `NULL` instead of
/// an array holding a single `NULL`.
macro_rules! film_work_query {
    ($predicate:literal, $tail:literal) => {
        concat!(
            "SELECT fw.modified, fw.id::text AS id, fw.rating, fw.title, fw.description,
                array_agg(DISTINCT genre.name) FILTER (WHERE genre.name IS NOT NULL) AS genres,
                array_agg(DISTINCT director.full_name) FILTER (WHERE director.full_name IS NOT NULL) AS directors,
                array_agg(DISTINCT actor.full_name) FILTER (WHERE actor.full_name IS NOT NULL) AS actors_names,
                array_agg(DISTINCT writer.full_name) FILTER (WHERE writer.full_name IS NOT NULL) AS writers_names,
                COALESCE(
                    json_agg(DISTINCT jsonb_build_object('id', actor.id, 'name', actor.full_name))
                        FILTER (WHERE actor.id IS NOT NULL),
                    '[]'
                ) AS actors,
                COALESCE(
                    json_agg(DISTINCT jsonb_build_object('id', writer.id, 'name', writer.full_name))
                        FILTER (WHERE writer.id IS NOT NULL),
                    '[]'
                ) AS writers
            FROM content.film_work fw
            LEFT JOIN content.genre_film_work gfw ON gfw.film_work_id = fw.id
            LEFT JOIN content.genre genre ON genre.id = gfw.genre_id
            LEFT JOIN content.person_film_work pfw ON pfw.film_work_id = fw.id
            LEFT JOIN content.person director ON director.id = pfw.person_id AND pfw.role = 'director'
            LEFT JOIN content.person actor ON actor.id = pfw.person_id AND pfw.role = 'actor'
            LEFT JOIN content.person writer ON writer.id = pfw.person_id AND pfw.role = 'writer'
            WHERE ",
            $predicate,
            "
            GROUP BY fw.id
            ORDER BY fw.modified",
            $tail
        )
    };
}

const DEPENDENCY_CHANGES_QUERY: &str = film_work_query!(
    "EXISTS (
                SELECT 1 FROM content.genre_film_work changed_gfw
                JOIN content.genre changed_genre ON changed_genre.id = changed_gfw.genre_id
                WHERE changed_gfw.film_work_id = fw.id AND changed_genre.modified > $1
            ) OR EXISTS (
                SELECT 1 FROM content.person_film_work changed_pfw
                JOIN content.person changed_person ON changed_person.id = changed_pfw.person_id
                WHERE changed_pfw.film_work_id = fw.id AND changed_person.modified > $1
            )",
    ""
);

const MODIFIED_SINCE_QUERY: &str = film_work_query!("fw.modified > $1", "\n            LIMIT $2");

/// Opens plain connections to the source database.
#[derive(Debug, Clone)]
pub struct PgSource {
    config: PgConnectionConfig,
}

impl PgSource {
    pub fn new(config: PgConnectionConfig) -> Self {
        Self { config }
    }
}

impl Source for PgSource {
    type Client = PgSourceClient;

    async fn connect(&self) -> EtlResult<PgSourceClient> {
        let config = self.config.with_db(Some(&SOURCE_CONNECTION_OPTIONS));
        let (client, connection) = config.connect(NoTls).await?;

        spawn_postgres_connection(connection);

        debug!(
            host = %self.config.host,
            database = %self.config.name,
            "connected to source database"
        );

        Ok(PgSourceClient { client })
    }
}

/// Drives the connection future until the paired [`Client`] is dropped.
fn spawn_postgres_connection(connection: Connection<Socket, tokio_postgres::tls::NoTlsStream>) {
    let span = tracing::Span::current();
    let task = async move {
        match connection.await {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => debug!("postgres connection terminated successfully"),
        }
    }
    .instrument(span);

    tokio::spawn(task);
}

/// A live connection to the source database.
#[derive(Debug)]
pub struct PgSourceClient {
    client: Client,
}

impl SourceClient for PgSourceClient {
    async fn dependency_changes_since(&self, since: Watermark) -> EtlResult<Vec<SourceRow>> {
        let since = since.to_utc();
        let rows = self
            .client
            .query(DEPENDENCY_CHANGES_QUERY, &[&since])
            .await?;

        if !rows.is_empty() {
            info!(count = rows.len(), "found film works with modified genres or persons");
        }

        rows.iter().map(source_row).collect()
    }

    async fn modified_since(&self, since: Watermark, limit: usize) -> EtlResult<Vec<SourceRow>> {
        let since = since.to_utc();
        let limit = i64::try_from(limit).map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Chunk size does not fit a query limit",
                limit,
                source: err
            )
        })?;

        let rows = self
            .client
            .query(MODIFIED_SINCE_QUERY, &[&since, &limit])
            .await?;

        rows.iter().map(source_row).collect()
    }
}

fn source_row(row: &Row) -> EtlResult<SourceRow> {
    let modified: DateTime<Utc> = row.try_get("modified")?;
    let actors: Json<Vec<PersonRef>> = row.try_get("actors")?;
    let writers: Json<Vec<PersonRef>> = row.try_get("writers")?;

    let film_work = FilmWorkRow {
        id: row.try_get("id")?,
        rating: row.try_get("rating")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        genres: row.try_get("genres")?,
        directors: row.try_get("directors")?,
        actors_names: row.try_get("actors_names")?,
        writers_names: row.try_get("writers_names")?,
        actors: Some(actors.0),
        writers: Some(writers.0),
    };

    Ok(SourceRow::new(modified.into(), film_work))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_sweep_is_ordered_and_limited() {
        assert!(MODIFIED_SINCE_QUERY.contains("WHERE fw.modified > $1"));
        assert!(MODIFIED_SINCE_QUERY.trim_end().ends_with("LIMIT $2"));
        assert!(MODIFIED_SINCE_QUERY.contains("ORDER BY fw.modified"));
    }

    #[test]
    fn dependency_sweep_checks_genres_and_persons() {
        assert!(DEPENDENCY_CHANGES_QUERY.contains("changed_genre.modified > $1"));
        assert!(DEPENDENCY_CHANGES_QUERY.contains("changed_person.modified > $1"));
        assert!(!DEPENDENCY_CHANGES_QUERY.contains("LIMIT"));
    }
}
