use serde::{Deserialize, Serialize};

use crate::types::{FilmWorkRow, PersonRef};

/// The document indexed for one film work.
///
/// Unlike [`FilmWorkRow`], every aggregate is a list; a film work without genres has
/// `"genre": []`, never `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmWorkDocument {
    pub id: String,
    pub imdb_rating: Option<f64>,
    pub title: String,
    pub description: Option<String>,
    pub genre: Vec<String>,
    pub director: Vec<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub actors: Vec<PersonRef>,
    pub writers: Vec<PersonRef>,
}

impl From<FilmWorkRow> for FilmWorkDocument {
    fn from(row: FilmWorkRow) -> Self {
        Self {
            id: row.id,
            imdb_rating: row.rating,
            title: row.title,
            description: row.description,
            genre: row.genres.unwrap_or_default(),
            director: row.directors.unwrap_or_default(),
            actors_names: row.actors_names.unwrap_or_default(),
            writers_names: row.writers_names.unwrap_or_default(),
            actors: row.actors.unwrap_or_default(),
            writers: row.writers.unwrap_or_default(),
        }
    }
}
