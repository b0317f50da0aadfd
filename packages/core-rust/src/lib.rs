//! `driftnet` Core: cancellable operations, bounded operation pools, and the
//! blocking execution driver.
//!
//! Work is modelled as a tree: a root [`Operation`] submits children into an
//! [`OperationPool`], which bounds concurrency, fans out stop requests, and
//! folds child outcomes into one [`Outcome`].

pub mod config;
pub mod error;
pub mod execute;
pub mod heartbeat;
pub mod operation;
pub mod outcome;
pub mod pool;
pub mod stop;
pub mod stopper;

pub use config::{ExecutorConfig, PoolConfig};
pub use error::PoolError;
pub use execute::{drive, execute, execute_task, Executor};
pub use heartbeat::{HeartbeatMonitor, DEFAULT_HEARTBEAT_INTERVAL};
pub use operation::{FnOperation, Operation, OperationContext, Task, TaskState};
pub use outcome::Outcome;
pub use pool::{OperationPool, PoolStats};
pub use stop::{StopToken, Stoppable};
pub use stopper::Stopper;
