//! Per-request cancellation and deadline context.
//!
//! In-memory operations accept a context and ignore it. Anything that waits on
//! the network runs through [`RequestContext::run`] so the caller's deadline is
//! honoured even when the underlying client would keep waiting.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Error;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// No deadline, never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// Derive a context that is cancelled together with `token`.
    pub fn with_token(mut self, token: &CancellationToken) -> Self {
        self.cancel = token.child_token();
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Race `fut` against the deadline and the cancellation token.
    ///
    /// Losing the race surfaces as `UpstreamUnavailable`; the future is dropped.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if self.is_cancelled() {
            return Err(Error::UpstreamUnavailable("request cancelled".into()));
        }

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    res = fut => res,
                    _ = tokio::time::sleep_until(deadline) => {
                        Err(Error::UpstreamUnavailable("deadline exceeded".into()))
                    }
                    _ = self.cancel.cancelled() => {
                        Err(Error::UpstreamUnavailable("request cancelled".into()))
                    }
                }
            }
            None => {
                tokio::select! {
                    res = fut => res,
                    _ = self.cancel.cancelled() => {
                        Err(Error::UpstreamUnavailable("request cancelled".into()))
                    }
                }
            }
        }
    }
}
