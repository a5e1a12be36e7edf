//! Per-request deadline and cancellation
//!
//! A [`QueryContext`] travels with every backend call. Both class
//! sub-queries of a request share it, so a fired deadline or a cancelled
//! token aborts whichever query is still running. An aborted query is a
//! backend failure, never a "no data" outcome.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation token for one request
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl QueryContext {
    /// A context with no deadline and a fresh token
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire `timeout` from now
    ///
    /// A timeout too large to represent leaves the context without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Expire at `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Observe an existing cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Token that cancels this request
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every query running under this context
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run `fut` until it completes, the deadline fires, or the request is cancelled
    ///
    /// `operation` names the query in the returned error.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(operation.to_string()));
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(operation.to_string())),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled(operation.to_string())),
            result = bounded => result,
        }
    }
}
