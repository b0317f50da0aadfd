//! Skeleton shared by scans and bulk loads.
//!
//! A pipeline produces items sequentially on its own task and fans them
//! into a child pool bound to its stop token, while a heartbeat reports
//! progress. [`Pipeline::finish`] drains the pool and folds the producer's
//! result together with the pool aggregate.

use std::sync::Arc;
use std::time::Duration;

use driftnet_core::{
    HeartbeatMonitor, Operation, OperationContext, OperationPool, Outcome, PoolConfig, PoolError,
};
use tracing::{debug, error};

use crate::progress::{Progress, ProgressSnapshot};

/// How a pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Completion {
    pub outcome: Outcome,
    /// True when the producer ran to the end and no item was stopped, i.e.
    /// the completion callback should fire.
    pub completed: bool,
}

pub(crate) struct Pipeline {
    pool: OperationPool,
    heartbeat: HeartbeatMonitor,
    progress: Arc<Progress>,
}

impl Pipeline {
    /// Starts the heartbeat and creates the child pool.
    pub(crate) fn begin<F>(
        name: &str,
        ctx: &OperationContext,
        threads: usize,
        heartbeat_interval: Duration,
        progress: Arc<Progress>,
        mut on_heartbeat: F,
    ) -> Self
    where
        F: FnMut(&ProgressSnapshot) + Send + 'static,
    {
        let pool = OperationPool::child_of(PoolConfig::new(name, threads), ctx.stop_token());
        let ticking = Arc::clone(&progress);
        let heartbeat = HeartbeatMonitor::start(
            heartbeat_interval,
            ctx.stop_token().clone(),
            move || {
                let snapshot = ticking.snapshot();
                debug!(
                    listed = snapshot.listed,
                    processed = snapshot.processed(),
                    elapsed_ms = snapshot.elapsed_ms,
                    "heartbeat"
                );
                on_heartbeat(&snapshot);
            },
        );
        Self {
            pool,
            heartbeat,
            progress,
        }
    }

    /// Submits one item, waiting while the pool is saturated.
    ///
    /// Returns `Ok(false)` once the pool has been stopped.
    pub(crate) async fn dispatch<O: Operation>(&self, item: O) -> anyhow::Result<bool> {
        match self.pool.submit(item).await {
            Ok(_) => {
                self.progress.add_dispatched();
                Ok(true)
            }
            Err(PoolError::Stopped { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Drains the pool, stops the heartbeat, and combines outcomes.
    pub(crate) async fn finish(mut self, produced: anyhow::Result<Outcome>) -> Completion {
        let produced = match produced {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = ?err, "producer failed; draining dispatched items");
                Outcome::Error
            }
        };

        let drained = self.pool.join().await;
        self.heartbeat.stop().await;

        Completion {
            outcome: produced.combine(drained),
            completed: produced.is_success() && drained != Outcome::Stopped,
        }
    }
}
