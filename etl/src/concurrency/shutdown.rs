//! Shutdown broadcast used to stop every worker of a pipeline.
//!
//! The channel carries a single boolean that flips to `true` once. Receivers created after
//! the flip still observe it, so a worker that subscribes late cannot miss a shutdown.

use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals shutdown to every current and future receiver.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been requested.
    ///
    /// Never resolves if the sender is dropped without signalling.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|shutdown| *shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Outcome of an operation that can be cut short by shutdown.
#[derive(Debug, PartialEq, Eq)]
pub enum ShutdownResult<T, I> {
    Ok(T),
    Shutdown(I),
}

impl<T, I> ShutdownResult<T, I> {
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown(_))
    }
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

/// Sleeps for `duration` unless shutdown is requested first.
pub async fn sleep_or_shutdown(
    shutdown_rx: &mut ShutdownRx,
    duration: Duration,
) -> ShutdownResult<(), ()> {
    if shutdown_rx.is_shutdown() {
        return ShutdownResult::Shutdown(());
    }

    tokio::select! {
        biased;

        _ = shutdown_rx.wait() => ShutdownResult::Shutdown(()),
        _ = tokio::time::sleep(duration) => ShutdownResult::Ok(()),
    }
}
