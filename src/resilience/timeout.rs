//! Deadline around token issuance.
//!
//! The work runs as its own task and reports through a oneshot channel. If the
//! deadline wins the race the task is told to stop via its cancellation token
//! and its eventual result, if any, is dropped with the channel.

use crate::errors::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutGovernor {
    timeout: Duration,
}

impl TimeoutGovernor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Spawn `work` and wait for it up to the configured timeout.
    ///
    /// The result is passed through unchanged when it arrives in time. On
    /// expiry this returns [`Error::Timeout`] and cancels the token handed to
    /// `work`. A task that dies without reporting (a panic) surfaces as
    /// [`Error::PanicRecovered`].
    pub async fn run<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let task = work(cancel.clone());

        tokio::spawn(async move {
            let result = task.await;
            // The receiver is gone once the deadline has fired.
            let _ = tx.send(result);
        });

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::panic_recovered(
                "token issuance task",
                "task ended without reporting a result",
            )),
            Err(elapsed) => {
                cancel.cancel();
                warn!(timeout_ms = self.timeout.as_millis() as u64, "token generation timed out");
                Err(Error::Timeout { timeout: self.timeout, cause: elapsed.to_string() })
            }
        }
    }
}
