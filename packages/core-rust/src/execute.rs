//! Execution driver: run a root operation to completion and return one outcome.
//!
//! [`drive`] runs inside an existing runtime. [`Executor`] owns the runtime
//! itself and blocks the calling thread until the whole task tree is
//! terminal; it must not be called from within an async context.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tracing::{error, warn};

use crate::config::{ExecutorConfig, PoolConfig};
use crate::operation::{Operation, Task};
use crate::outcome::Outcome;
use crate::pool::OperationPool;

/// Runs `task` in the current runtime and returns its outcome.
///
/// If the task was already started elsewhere, returns whatever outcome it
/// recorded, or `default` if it has none yet.
pub async fn drive(task: &Task, default: Outcome) -> Outcome {
    match task.run().await {
        Some(outcome) => outcome,
        None => {
            warn!(task_id = task.id(), op = task.name(), "task was already started");
            task.outcome().unwrap_or(default)
        }
    }
}

/// Blocking front door for running operation trees.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Runs `op` as a root task and blocks until it is terminal.
    pub fn execute<O: Operation>(&self, op: O, default: Outcome) -> Outcome {
        self.execute_task(&Task::new(op), default)
    }

    /// Runs an existing task, letting the caller keep a handle for `stop()`.
    pub fn execute_task(&self, task: &Arc<Task>, default: Outcome) -> Outcome {
        match self.runtime() {
            Some(runtime) => runtime.block_on(drive(task, default)),
            None => default,
        }
    }

    /// Runs every operation through one pool of `concurrency` slots and
    /// returns the pool aggregate.
    pub fn execute_all<I, O>(&self, ops: I, concurrency: usize, default: Outcome) -> Outcome
    where
        I: IntoIterator<Item = O>,
        O: Operation,
    {
        let Some(runtime) = self.runtime() else {
            return default;
        };
        runtime.block_on(async move {
            let pool = OperationPool::new(PoolConfig::new("execute-all", concurrency));
            for op in ops {
                if pool.submit(op).await.is_err() {
                    break;
                }
            }
            pool.join().await
        })
    }

    fn runtime(&self) -> Option<Runtime> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(self.config.thread_name.clone());
        if let Some(threads) = self.config.worker_threads {
            builder.worker_threads(threads.max(1));
        }
        match builder.build() {
            Ok(runtime) => Some(runtime),
            Err(err) => {
                error!(error = %err, "failed to build execution runtime");
                None
            }
        }
    }
}

/// Runs `op` with the default executor; see [`Executor::execute`].
pub fn execute<O: Operation>(op: O, default: Outcome) -> Outcome {
    Executor::default().execute(op, default)
}

/// Runs `task` with the default executor; see [`Executor::execute_task`].
pub fn execute_task(task: &Arc<Task>, default: Outcome) -> Outcome {
    Executor::default().execute_task(task, default)
}
