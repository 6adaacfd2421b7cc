use serde::{Deserialize, Serialize};

use crate::state::Watermark;

/// A person attached to a film work in a given role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: String,
    pub name: String,
}

/// A film work as extracted from the source, before any reshaping.
///
/// Aggregates are `None` when the film work has no related entries. This is the shape stored
/// in the `extracted_data` slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmWorkRow {
    pub id: String,
    pub rating: Option<f64>,
    pub title: String,
    pub description: Option<String>,
    pub genres: Option<Vec<String>>,
    pub directors: Option<Vec<String>>,
    pub actors_names: Option<Vec<String>>,
    pub writers_names: Option<Vec<String>>,
    pub actors: Option<Vec<PersonRef>>,
    pub writers: Option<Vec<PersonRef>>,
}

/// A [`FilmWorkRow`] together with the modification time it was selected by.
///
/// The modification time only drives watermarks and is stripped before publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub modified: Watermark,
    pub row: FilmWorkRow,
}

impl SourceRow {
    pub fn new(modified: Watermark, row: FilmWorkRow) -> Self {
        Self { modified, row }
    }

    pub fn into_row(self) -> FilmWorkRow {
        self.row
    }
}
