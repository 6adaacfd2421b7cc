//! Records flowing through the pipeline.

mod document;
mod film_work;

pub use document::FilmWorkDocument;
pub use film_work::{FilmWorkRow, PersonRef, SourceRow};
