//! Configuration for pools and the blocking executor.
//!
//! Plain structs with `Default`; callers construct them explicitly and pass
//! them in. Nothing here is read from process-global state.

/// Configuration for one [`OperationPool`](crate::pool::OperationPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Name used in logs.
    pub name: String,
    /// Maximum number of children running at once. Never less than 1.
    pub max_concurrency: usize,
}

impl PoolConfig {
    /// Creates a pool config, clamping `max_concurrency` to at least 1.
    pub fn new(name: impl Into<String>, max_concurrency: usize) -> Self {
        Self {
            name: name.into(),
            max_concurrency: max_concurrency.max(1),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new("pool", default_parallelism())
    }
}

/// Configuration for the blocking [`Executor`](crate::execute::Executor).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Runtime worker threads. `None` uses the tokio default (one per core).
    pub worker_threads: Option<usize>,
    /// Prefix for runtime thread names.
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: "driftnet-worker".to_string(),
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
