//! Errors surfaced by the operation framework.

/// Errors returned when submitting work to an [`OperationPool`](crate::pool::OperationPool).
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool {pool} has been stopped")]
    Stopped { pool: String },
    #[error("pool {pool} is closed to new submissions")]
    Closed { pool: String },
    #[error("task {task_id} was already started")]
    AlreadyStarted { task_id: u64 },
}
