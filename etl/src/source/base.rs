use std::future::Future;

use crate::error::EtlResult;
use crate::state::Watermark;
use crate::types::SourceRow;

/// Trait for systems the extract stage can open connections to.
///
/// A connection is opened per extract iteration and dropped at the end of it, so
/// implementations do not need to handle reconnection themselves. Connection failures
/// should be reported as [`crate::error::ErrorKind::SourceConnectionFailed`] so they are
/// retried with backoff.
pub trait Source {
    type Client: SourceClient + Send + Sync;

    fn connect(&self) -> impl Future<Output = EtlResult<Self::Client>> + Send;
}

/// An open connection able to run the two change-detection sweeps.
pub trait SourceClient {
    /// Returns every film work linked to a genre or person modified after `since`.
    fn dependency_changes_since(
        &self,
        since: Watermark,
    ) -> impl Future<Output = EtlResult<Vec<SourceRow>>> + Send;

    /// Returns at most `limit` film works modified after `since`, oldest first.
    fn modified_since(
        &self,
        since: Watermark,
        limit: usize,
    ) -> impl Future<Output = EtlResult<Vec<SourceRow>>> + Send;
}
