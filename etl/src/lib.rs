//! Incremental replication of a Postgres film catalogue into a search index.
//!
//! A [`pipeline::Pipeline`] runs three polling workers that hand batches to each other
//! through a persisted [`state::State`]:
//!
//! - extract reads changed film works from a [`source::Source`] into `extracted_data`,
//! - transform turns them into documents in `transformed_data`,
//! - load upserts the documents into a [`destination::Destination`].
//!
//! Every state mutation is persisted before it becomes visible, so a restarted pipeline
//! resumes from the last committed watermark and batch.

pub mod backoff;
pub mod concurrency;
pub mod destination;
pub mod error;
mod macros;
pub mod pipeline;
pub mod source;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
