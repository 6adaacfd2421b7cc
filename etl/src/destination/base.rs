use std::future::Future;

use crate::error::EtlResult;
use crate::types::FilmWorkDocument;

/// Trait for indexes that store documents by identifier.
///
/// Delivery is at-least-once: after a connectivity failure the load stage sends the whole
/// batch again, so [`Destination::upsert_document`] must be idempotent per `id`.
///
/// Implementations report failures that are worth retrying (unreachable index, overload)
/// as [`crate::error::ErrorKind::DestinationConnectionFailed`]. Any other error is taken
/// as a permanent rejection of that single document.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Creates or replaces the document stored under `id`.
    fn upsert_document(
        &self,
        id: &str,
        document: &FilmWorkDocument,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
