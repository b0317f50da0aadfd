//! Cancellable units of work.
//!
//! An [`Operation`] supplies a body; a [`Task`] wraps one operation with the
//! bookkeeping the framework needs: a lifecycle state, a stop flag, and a
//! once-written [`Outcome`]. Bodies poll their stop flag at safe points and
//! return [`Outcome::Stopped`] once they see it; nothing preempts them.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{debug, error};

use crate::outcome::Outcome;
use crate::stop::{StopToken, Stoppable};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Operation trait
// ---------------------------------------------------------------------------

/// A body of cancellable work producing one [`Outcome`].
///
/// The body is invoked at most once. Returning `Err` (or panicking) is
/// recorded as [`Outcome::Error`] by the wrapping [`Task`]; the failure is
/// logged, never rethrown to the caller.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs the body. Implementations must check `ctx.is_stopped()` before
    /// blocking I/O, at loop boundaries, and before submitting child work.
    async fn run(&self, ctx: &OperationContext) -> anyhow::Result<Outcome>;
}

/// Per-invocation context handed to [`Operation::run`].
#[derive(Debug, Clone)]
pub struct OperationContext {
    task_id: u64,
    stop: StopToken,
}

impl OperationContext {
    #[must_use]
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    #[must_use]
    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }
}

// ---------------------------------------------------------------------------
// FnOperation
// ---------------------------------------------------------------------------

/// Adapts an async closure into an [`Operation`].
///
/// The closure receives a clone of the task's [`StopToken`].
pub struct FnOperation<F> {
    name: String,
    body: F,
}

impl<F> FnOperation<F> {
    pub fn new<Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(StopToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Outcome>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body,
        }
    }
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(StopToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Outcome>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &OperationContext) -> anyhow::Result<Outcome> {
        (self.body)(ctx.stop_token().clone()).await
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Lifecycle of a [`Task`].
///
/// State machine: Created -> Running -> Done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Done,
}

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// One scheduled instance of an [`Operation`].
///
/// Mutated only by the thread running the body (which writes the outcome
/// once) and by any thread calling [`stop`](Task::stop).
pub struct Task {
    id: u64,
    op: Arc<dyn Operation>,
    stop: StopToken,
    state: AtomicU8,
    outcome: OnceLock<Outcome>,
}

impl Task {
    /// Wraps an operation in a fresh task in the `Created` state.
    pub fn new<O: Operation>(op: O) -> Arc<Self> {
        Self::from_arc(Arc::new(op))
    }

    #[must_use]
    pub fn from_arc(op: Arc<dyn Operation>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            op,
            stop: StopToken::new(),
            state: AtomicU8::new(CREATED),
            outcome: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.op.name()
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            CREATED => TaskState::Created,
            RUNNING => TaskState::Running,
            _ => TaskState::Done,
        }
    }

    /// The recorded outcome, once the task is done.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome.get().copied()
    }

    /// Requests a cooperative stop. Safe before, during, or after execution.
    pub fn stop(&self) {
        self.stop.stop();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    #[must_use]
    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Runs the body in the current task and records its outcome.
    ///
    /// Returns `None` if the task had already been started by someone else.
    /// If a stop was requested before start, the body is never invoked and
    /// the outcome is [`Outcome::Stopped`].
    pub async fn run(&self) -> Option<Outcome> {
        if self
            .state
            .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let outcome = if self.stop.is_stopped() {
            debug!(task_id = self.id, op = self.name(), "stop requested before start");
            Outcome::Stopped
        } else {
            self.run_body().await
        };

        let _ = self.outcome.set(outcome);
        self.state.store(DONE, Ordering::Release);
        Some(outcome)
    }

    async fn run_body(&self) -> Outcome {
        let ctx = OperationContext {
            task_id: self.id,
            stop: self.stop.clone(),
        };

        match AssertUnwindSafe(self.op.run(&ctx)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                error!(
                    task_id = self.id,
                    op = self.name(),
                    error = ?err,
                    "operation failed"
                );
                Outcome::Error
            }
            Err(payload) => {
                error!(
                    task_id = self.id,
                    op = self.name(),
                    panic = panic_message(payload.as_ref()),
                    "operation panicked"
                );
                Outcome::Error
            }
        }
    }
}

impl Stoppable for Task {
    fn stop(&self) {
        Task::stop(self);
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("op", &self.name())
            .field("state", &self.state())
            .field("stopped", &self.is_stopped())
            .field("outcome", &self.outcome())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
