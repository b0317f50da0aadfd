//! Periodic liveness callback for long-running composite operations.
//!
//! A [`HeartbeatMonitor`] owns one timer task that calls a progress callback
//! on every tick, independent of whatever the worker tasks are doing.
//! Delivery is best-effort: there is no guaranteed final tick at completion
//! and a very short operation may see no ticks at all.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::stop::StopToken;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running heartbeat timer.
///
/// The timer ends on [`stop`](Self::stop), on drop of the handle, or when
/// the associated stop token fires.
pub struct HeartbeatMonitor {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    /// Starts calling `on_tick` every `interval` until stopped.
    ///
    /// The first immediate tick is skipped, so the earliest call happens one
    /// full interval after start.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, or if `interval` is zero.
    pub fn start<F>(interval: Duration, stop: StopToken, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick so the callback doesn't fire at startup.
            ticks.tick().await;

            loop {
                tokio::select! {
                    _ = ticks.tick() => on_tick(),
                    () = stop.stopped() => break,
                    // Fires on an explicit stop and when the sender is dropped.
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stops the timer and waits for it to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
