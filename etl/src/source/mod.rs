//! Sources that report which film works changed since a watermark.

mod base;
pub mod postgres;

pub use base::{Source, SourceClient};
pub use postgres::{PgSource, PgSourceClient};
