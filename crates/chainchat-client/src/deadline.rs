use std::future::Future;
use std::time::Duration;

use chainchat_core::{ChainChatError, Result};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Whole-request deadline shared by every await of one streaming call.
///
/// When the deadline passes the token is cancelled, so anything else
/// watching the same token sees the abort as well.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Deadline {
    pub fn after(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            at: Instant::now() + timeout,
            timeout,
            cancel,
        }
    }

    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChainChatError::Cancelled),
            _ = sleep_until(self.at) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "Request deadline exceeded, aborting");
                self.cancel.cancel();
                Err(ChainChatError::Timeout(self.timeout))
            }
            out = fut => Ok(out),
        }
    }
}
