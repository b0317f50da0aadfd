//! Bounded concurrent scheduler for child operations.
//!
//! [`OperationPool`] admits children one at a time through a semaphore sized
//! to the configured concurrency: when every permit is taken, `submit`
//! waits, which pushes back on whoever is producing work. Admitted children
//! run on the tokio runtime, sit in a live registry while running, and fold
//! their outcomes into a tally that `join` turns into one aggregate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::operation::{Operation, Task, TaskState};
use crate::outcome::Outcome;
use crate::stop::{StopToken, Stoppable};

// ---------------------------------------------------------------------------
// PoolStats
// ---------------------------------------------------------------------------

/// Point-in-time counters for a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub admitted: u64,
    pub running: u64,
    pub succeeded: u64,
    pub stopped: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Tally {
    admitted: AtomicU64,
    succeeded: AtomicU64,
    stopped: AtomicU64,
    failed: AtomicU64,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between the pool handle, its spawned children, and the
/// parent-stop watcher.
struct PoolShared {
    name: String,
    permits: Arc<Semaphore>,
    live: DashMap<u64, Arc<Task>>,
    stop: StopToken,
    tracker: TaskTracker,
    tally: Tally,
    /// Set when `stop()` lands before `join()` closed admission.
    stopped_while_open: AtomicBool,
}

impl PoolShared {
    fn stop(&self) {
        if !self.tracker.is_closed() {
            self.stopped_while_open.store(true, Ordering::SeqCst);
        }
        self.stop.stop();
        // Wakes blocked submitters with an error and refuses new permits.
        self.permits.close();

        let mut fanned_out = 0_usize;
        for entry in &self.live {
            entry.value().stop();
            fanned_out += 1;
        }
        debug!(pool = %self.name, live = fanned_out, "pool stop requested");
    }

    fn record(&self, task: &Task, outcome: Outcome) {
        self.live.remove(&task.id());
        let counter = match outcome {
            Outcome::Success => &self.tally.succeeded,
            Outcome::Stopped => &self.tally.stopped,
            Outcome::Error => &self.tally.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        trace!(pool = %self.name, task_id = task.id(), %outcome, "child finished");
    }

    fn stats(&self) -> PoolStats {
        let admitted = self.tally.admitted.load(Ordering::SeqCst);
        let succeeded = self.tally.succeeded.load(Ordering::SeqCst);
        let stopped = self.tally.stopped.load(Ordering::SeqCst);
        let failed = self.tally.failed.load(Ordering::SeqCst);
        PoolStats {
            admitted,
            running: admitted.saturating_sub(succeeded + stopped + failed),
            succeeded,
            stopped,
            failed,
        }
    }

    fn aggregate(&self) -> Outcome {
        let stats = self.stats();
        let mut outcome = Outcome::Success;
        if stats.stopped > 0 || self.stopped_while_open.load(Ordering::SeqCst) {
            outcome = outcome.combine(Outcome::Stopped);
        }
        if stats.failed > 0 {
            outcome = outcome.combine(Outcome::Error);
        }
        outcome
    }

    fn stopped_error(&self) -> PoolError {
        PoolError::Stopped {
            pool: self.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationPool
// ---------------------------------------------------------------------------

/// Bounded scheduler for child operations.
///
/// Lifecycle:
/// 1. `submit()` any number of children (blocks while saturated)
/// 2. optionally `stop()` from any thread to fan out a stop request
/// 3. `join()` once to close admission, drain, and get the aggregate
pub struct OperationPool {
    shared: Arc<PoolShared>,
    max_concurrency: usize,
    parent_watch: Option<JoinHandle<()>>,
}

impl OperationPool {
    /// Creates a free-standing pool.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let max_concurrency = config.max_concurrency.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            shared: Arc::new(PoolShared {
                name: config.name,
                permits: Arc::new(Semaphore::new(max_concurrency)),
                live: DashMap::new(),
                stop: StopToken::new(),
                tracker: TaskTracker::new(),
                tally: Tally::default(),
                stopped_while_open: AtomicBool::new(false),
            }),
            max_concurrency,
            parent_watch: None,
        }
    }

    /// Creates a pool that stops itself when `parent` is stopped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn child_of(config: PoolConfig, parent: &StopToken) -> Self {
        let mut pool = Self::new(config);
        let shared = Arc::clone(&pool.shared);
        let parent = parent.clone();
        pool.parent_watch = Some(tokio::spawn(async move {
            parent.stopped().await;
            shared.stop();
        }));
        pool
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_stopped()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Number of children currently registered as running.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.shared.live.len()
    }

    /// Wraps `op` in a new task and submits it.
    ///
    /// # Errors
    ///
    /// See [`submit_task`](Self::submit_task).
    pub async fn submit<O: Operation>(&self, op: O) -> Result<Arc<Task>, PoolError> {
        self.submit_task(Task::new(op)).await
    }

    /// Schedules a task, waiting for a free slot if the pool is saturated.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Stopped`] if the pool was stopped before or while waiting
    /// - [`PoolError::Closed`] if `join()` has already closed admission
    /// - [`PoolError::AlreadyStarted`] if the task is not in the `Created` state
    pub async fn submit_task(&self, task: Arc<Task>) -> Result<Arc<Task>, PoolError> {
        let shared = &self.shared;
        if task.state() != TaskState::Created {
            return Err(PoolError::AlreadyStarted { task_id: task.id() });
        }
        if shared.stop.is_stopped() {
            return Err(shared.stopped_error());
        }
        if shared.tracker.is_closed() {
            return Err(PoolError::Closed {
                pool: shared.name.clone(),
            });
        }

        let permit = Arc::clone(&shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| shared.stopped_error())?;

        shared.live.insert(task.id(), Arc::clone(&task));
        // A stop that raced the insert may have missed this task in its fan-out.
        if shared.stop.is_stopped() {
            task.stop();
        }
        shared.tally.admitted.fetch_add(1, Ordering::SeqCst);

        let child = Arc::clone(&task);
        let child_shared = Arc::clone(shared);
        shared.tracker.spawn(async move {
            let outcome = child.run().await.unwrap_or(Outcome::Error);
            child_shared.record(&child, outcome);
            drop(permit);
        });

        Ok(task)
    }

    /// Requests a stop: refuses further submissions and stops every live child.
    ///
    /// Does not wait for children to halt; use [`join`](Self::join) for that.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Closes admission, waits for every admitted child to finish, and
    /// returns the aggregate outcome.
    ///
    /// `Error` if any child errored; otherwise `Stopped` if any child stopped
    /// or the pool was stopped while still admitting; otherwise `Success`.
    pub async fn join(&self) -> Outcome {
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        if let Some(watch) = &self.parent_watch {
            watch.abort();
        }

        let outcome = self.shared.aggregate();
        let stats = self.shared.stats();
        debug!(
            pool = %self.shared.name,
            admitted = stats.admitted,
            succeeded = stats.succeeded,
            stopped = stats.stopped,
            failed = stats.failed,
            %outcome,
            "pool drained"
        );
        outcome
    }
}

impl Stoppable for OperationPool {
    fn stop(&self) {
        OperationPool::stop(self);
    }
}

impl Drop for OperationPool {
    fn drop(&mut self) {
        if let Some(watch) = self.parent_watch.take() {
            watch.abort();
        }
    }
}

impl std::fmt::Debug for OperationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationPool")
            .field("name", &self.shared.name)
            .field("max_concurrency", &self.max_concurrency)
            .field("stopped", &self.is_stopped())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::operation::FnOperation;

    fn fixed(outcome: Outcome) -> impl Operation {
        FnOperation::new("fixed", move |_stop| std::future::ready(Ok(outcome)))
    }

    /// Sleeps for `delay`, tracking the peak number of concurrent bodies.
    fn tracked_sleep(
        delay: Duration,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    ) -> impl Operation {
        FnOperation::new("sleep", move |_stop| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(Outcome::Success)
            }
        })
    }

    /// Runs until its stop flag is observed.
    fn until_stopped() -> impl Operation {
        FnOperation::new("until-stopped", |stop: StopToken| async move {
            while !stop.is_stopped() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Ok(Outcome::Stopped)
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn all_successes_aggregate_to_success_for_any_size() {
        for size in [1, 2, 4, 8] {
            let pool = OperationPool::new(PoolConfig::new("ok", size));
            let calls = Arc::new(AtomicUsize::new(0));
            for _ in 0..25 {
                let calls = Arc::clone(&calls);
                pool.submit(FnOperation::new("count", move |_stop| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Outcome::Success)
                    }
                }))
                .await
                .unwrap();
            }

            assert_eq!(pool.join().await, Outcome::Success);
            assert_eq!(calls.load(Ordering::SeqCst), 25);
            let stats = pool.stats();
            assert_eq!(stats.admitted, 25);
            assert_eq!(stats.succeeded, 25);
            assert_eq!(stats.running, 0);
            assert_eq!(pool.live_count(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_slot_serializes_work() {
        let pool = OperationPool::new(PoolConfig::new("serial", 1));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(20);

        let start = Instant::now();
        for _ in 0..5 {
            pool.submit(tracked_sleep(delay, current.clone(), peak.clone()))
                .await
                .unwrap();
        }
        assert_eq!(pool.join().await, Outcome::Success);

        assert!(start.elapsed() >= delay * 5);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_bound() {
        let pool = OperationPool::new(PoolConfig::new("bounded", 3));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..12 {
            pool.submit(tracked_sleep(
                Duration::from_millis(5),
                current.clone(),
                peak.clone(),
            ))
            .await
            .unwrap();
        }
        assert_eq!(pool.join().await, Outcome::Success);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn error_dominates_aggregate() {
        let pool = OperationPool::new(PoolConfig::new("mixed", 2));
        pool.submit(fixed(Outcome::Success)).await.unwrap();
        pool.submit(fixed(Outcome::Success)).await.unwrap();
        pool.submit(FnOperation::new("fails", |_stop| async {
            Err(anyhow::anyhow!("bad item"))
        }))
        .await
        .unwrap();

        assert_eq!(pool.join().await, Outcome::Error);
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn stopped_child_without_error_is_stopped() {
        let pool = OperationPool::new(PoolConfig::new("mixed", 2));
        pool.submit(fixed(Outcome::Success)).await.unwrap();
        pool.submit(fixed(Outcome::Stopped)).await.unwrap();
        assert_eq!(pool.join().await, Outcome::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn error_does_not_cancel_siblings() {
        let pool = OperationPool::new(PoolConfig::new("isolated", 4));
        pool.submit(FnOperation::new("fails", |_stop| async {
            Err(anyhow::anyhow!("bad item"))
        }))
        .await
        .unwrap();

        let mut siblings = Vec::new();
        for _ in 0..3 {
            siblings.push(
                pool.submit(FnOperation::new("slow", |stop: StopToken| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(if stop.is_stopped() {
                        Outcome::Stopped
                    } else {
                        Outcome::Success
                    })
                }))
                .await
                .unwrap(),
            );
        }

        assert_eq!(pool.join().await, Outcome::Error);
        for task in siblings {
            assert_eq!(task.outcome(), Some(Outcome::Success));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_fans_out_to_live_children() {
        let pool = OperationPool::new(PoolConfig::new("fanout", 4));
        let mut tasks = Vec::new();
        for _ in 0..4 {
            tasks.push(pool.submit(until_stopped()).await.unwrap());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.live_count(), 4);

        pool.stop();
        pool.stop();

        let outcome = tokio::time::timeout(Duration::from_secs(2), pool.join())
            .await
            .expect("children should observe the stop");
        assert_eq!(outcome, Outcome::Stopped);
        for task in tasks {
            assert!(task.is_stopped());
            assert_eq!(task.outcome(), Some(Outcome::Stopped));
        }
    }

    #[tokio::test]
    async fn submit_after_stop_is_rejected() {
        let pool = OperationPool::new(PoolConfig::new("stopped", 2));
        pool.stop();
        let err = pool.submit(fixed(Outcome::Success)).await.unwrap_err();
        assert!(matches!(err, PoolError::Stopped { .. }));
        assert_eq!(pool.join().await, Outcome::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_wakes_blocked_submitter() {
        let pool = Arc::new(OperationPool::new(PoolConfig::new("saturated", 1)));
        pool.submit(until_stopped()).await.unwrap();

        let blocked = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.submit(fixed(Outcome::Success)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        pool.stop();
        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("submitter should be released")
            .unwrap();
        assert!(matches!(result, Err(PoolError::Stopped { .. })));
        assert_eq!(pool.join().await, Outcome::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parent_stop_propagates_into_child_pool() {
        let parent = StopToken::new();
        let pool = OperationPool::child_of(PoolConfig::new("child", 2), &parent);
        let task = pool.submit(until_stopped()).await.unwrap();

        parent.stop();
        let outcome = tokio::time::timeout(Duration::from_secs(2), pool.join())
            .await
            .expect("parent stop should reach the child");
        assert_eq!(outcome, Outcome::Stopped);
        assert!(pool.is_stopped());
        assert_eq!(task.outcome(), Some(Outcome::Stopped));
    }

    #[tokio::test]
    async fn submit_after_join_is_rejected() {
        let pool = OperationPool::new(PoolConfig::new("closed", 1));
        assert_eq!(pool.join().await, Outcome::Success);
        let err = pool.submit(fixed(Outcome::Success)).await.unwrap_err();
        assert!(matches!(err, PoolError::Closed { .. }));
    }

    #[tokio::test]
    async fn started_task_is_rejected() {
        let pool = OperationPool::new(PoolConfig::new("dup", 1));
        let task = Task::new(fixed(Outcome::Success));
        let _ = task.run().await;
        let err = pool.submit_task(task).await.unwrap_err();
        assert!(matches!(err, PoolError::AlreadyStarted { .. }));
    }

    #[tokio::test]
    async fn stop_after_join_keeps_success() {
        let pool = OperationPool::new(PoolConfig::new("late-stop", 2));
        pool.submit(fixed(Outcome::Success)).await.unwrap();
        assert_eq!(pool.join().await, Outcome::Success);
        pool.stop();
        assert_eq!(pool.join().await, Outcome::Success);
    }
}
