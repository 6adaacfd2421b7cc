use std::fmt;

use tokio::task::JoinHandle;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// The three polling stages of a pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WorkerType {
    /// Polls the source and publishes `extracted_data`.
    Extract,
    /// Turns `extracted_data` into `transformed_data`.
    Transform,
    /// Delivers `transformed_data` to the destination.
    Load,
}

impl WorkerType {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerType::Extract => "extract",
            WorkerType::Transform => "transform",
            WorkerType::Load => "load",
        }
    }

    fn panic_kind(&self) -> ErrorKind {
        match self {
            WorkerType::Extract => ErrorKind::ExtractWorkerPanic,
            WorkerType::Transform => ErrorKind::TransformWorkerPanic,
            WorkerType::Load => ErrorKind::LoadWorkerPanic,
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle for waiting on a spawned worker.
///
/// A panic inside the worker task is turned into an error of the worker's panic kind
/// instead of propagating to the caller.
#[derive(Debug)]
pub struct WorkerHandle {
    worker_type: WorkerType,
    handle: Option<JoinHandle<EtlResult<()>>>,
}

impl WorkerHandle {
    pub(crate) fn new(worker_type: WorkerType, handle: JoinHandle<EtlResult<()>>) -> Self {
        Self {
            worker_type,
            handle: Some(handle),
        }
    }

    pub fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    /// Waits for the worker to finish and returns its result.
    pub async fn wait(mut self) -> EtlResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        let kind = self.worker_type.panic_kind();
        handle.await.map_err(|err| {
            if err.is_cancelled() {
                etl_error!(kind, "Worker was cancelled", err)
            } else {
                etl_error!(kind, "Worker panicked", err)
            }
        })??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_worker_result() {
        let handle = WorkerHandle::new(WorkerType::Load, tokio::spawn(async { Ok(()) }));
        assert!(handle.wait().await.is_ok());
    }

    fn explode() -> EtlResult<()> {
        panic!("boom")
    }

    #[tokio::test]
    async fn panic_is_reported_with_worker_kind() {
        let handle = WorkerHandle::new(WorkerType::Transform, tokio::spawn(async { explode() }));

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransformWorkerPanic);
    }

    #[test]
    fn worker_names() {
        assert_eq!(WorkerType::Extract.to_string(), "extract");
        assert_eq!(WorkerType::Transform.name(), "transform");
        assert_eq!(WorkerType::Load.name(), "load");
    }
}
