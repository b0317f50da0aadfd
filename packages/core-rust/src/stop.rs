//! Cooperative stop requests.
//!
//! A [`StopToken`] is a shared, monotonic flag. Setting it never blocks and
//! never interrupts anything by itself; running work polls
//! [`StopToken::is_stopped`] at safe points, and watchers await
//! [`StopToken::stopped`].

use std::sync::Arc;

use tokio::sync::watch;

/// Anything that can be asked to stop.
pub trait Stoppable: Send + Sync {
    /// Requests a cooperative stop. Must be idempotent and non-blocking.
    fn stop(&self);
}

/// Shared stop-request flag, cheap to clone.
///
/// State machine: not stopped -> stopped. There is no way back.
#[derive(Debug, Clone)]
pub struct StopToken {
    signal: Arc<watch::Sender<bool>>,
}

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            signal: Arc::new(tx),
        }
    }

    /// Sets the flag and wakes every task waiting in [`stopped`](Self::stopped).
    pub fn stop(&self) {
        // send_replace succeeds even with no live receivers.
        self.signal.send_replace(true);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once the flag has been set.
    pub async fn stopped(&self) {
        let mut rx = self.signal.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Stoppable for StopToken {
    fn stop(&self) {
        StopToken::stop(self);
    }
}
