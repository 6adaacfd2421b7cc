use crate::state::Watermark;
use crate::types::{FilmWorkRow, PersonRef, SourceRow};

/// Returns a fully populated film work with the given id.
pub fn film_work_row(id: &str) -> FilmWorkRow {
    FilmWorkRow {
        id: id.to_string(),
        rating: Some(7.5),
        title: format!("Film {id}"),
        description: Some(format!("Description of {id}")),
        genres: Some(vec!["Drama".to_string()]),
        directors: Some(vec!["Jane Director".to_string()]),
        actors_names: Some(vec!["John Actor".to_string()]),
        writers_names: Some(vec!["Ann Writer".to_string()]),
        actors: Some(vec![PersonRef {
            id: format!("{id}-actor"),
            name: "John Actor".to_string(),
        }]),
        writers: Some(vec![PersonRef {
            id: format!("{id}-writer"),
            name: "Ann Writer".to_string(),
        }]),
    }
}

/// Returns a film work without any related genre or person.
pub fn bare_film_work_row(id: &str) -> FilmWorkRow {
    FilmWorkRow {
        id: id.to_string(),
        rating: None,
        title: format!("Film {id}"),
        description: None,
        genres: None,
        directors: None,
        actors_names: None,
        writers_names: None,
        actors: None,
        writers: None,
    }
}

/// Returns [`film_work_row`] modified at `modified` (`YYYY-MM-DD HH:MM:SS`).
///
/// # Panics
///
/// Panics if `modified` is not a valid timestamp.
pub fn source_row(id: &str, modified: &str) -> SourceRow {
    SourceRow::new(watermark(modified), film_work_row(id))
}

/// Parses a watermark.
///
/// # Panics
///
/// Panics if `raw` is not a valid timestamp.
pub fn watermark(raw: &str) -> Watermark {
    match raw.parse() {
        Ok(watermark) => watermark,
        Err(err) => panic!("invalid watermark `{raw}` in test: {err}"),
    }
}
