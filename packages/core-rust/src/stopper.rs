//! Wall-clock limits for cooperative operations.
//!
//! There is no built-in timeout: a [`Stopper`] simply calls `stop()` on its
//! target once a delay has elapsed, from its own timer task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::stop::Stoppable;

/// Armed one-shot timer that stops a target after a delay.
#[derive(Debug)]
pub struct Stopper {
    fired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Stopper {
    /// Schedules `target.stop()` after `after`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn arm(target: Arc<dyn Stoppable>, after: Duration) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            info!(after_ms = duration_ms(after), "time limit reached, requesting stop");
            flag.store(true, Ordering::SeqCst);
            target.stop();
        });
        Self { fired, handle }
    }

    /// Cancels the timer if it has not fired yet.
    pub fn disarm(&self) {
        self.handle.abort();
    }

    /// Whether the timer fired and stopped its target.
    #[must_use]
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
