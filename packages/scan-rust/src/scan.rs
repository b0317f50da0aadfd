//! Paginated scan of an object store.
//!
//! State machine: Idle -> Listing -> Dispatching <-> Listing -> Draining ->
//! {Complete | Stopped | Error}
//!
//! Pages are requested strictly in sequence on the scan's own task, since a
//! continuation token is only valid for the next page. Every listed key
//! becomes a [`ScanItemOperation`] in the scan's child pool.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use driftnet_core::{execute, Operation, OperationContext, Outcome};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::RequestError;
use crate::item::{ItemOutcome, SkipReason};
use crate::listener::ScanListener;
use crate::pipeline::Pipeline;
use crate::progress::{Progress, ProgressSnapshot};
use crate::scope::Scope;
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// ScanRequest
// ---------------------------------------------------------------------------

/// Validated, immutable description of one scan.
#[derive(Clone)]
pub struct ScanRequest {
    store: Arc<dyn ObjectStore>,
    scope: Scope,
    listener: Arc<dyn ScanListener>,
    processing_threads: usize,
}

impl ScanRequest {
    /// Builds a request. `processing_threads` below 1 is clamped to 1.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::EmptyScope`] for a blank scope.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        scope: &str,
        listener: Arc<dyn ScanListener>,
        processing_threads: usize,
    ) -> Result<Self, RequestError> {
        Ok(Self {
            store,
            scope: Scope::parse(scope)?,
            listener,
            processing_threads: processing_threads.max(1),
        })
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn processing_threads(&self) -> usize {
        self.processing_threads
    }

    #[must_use]
    pub fn into_operation(self, config: PipelineConfig) -> ScanOperation {
        ScanOperation::new(self, config)
    }

    /// Runs the scan on a fresh runtime, blocking until every item is done.
    #[must_use]
    pub fn execute(self, config: PipelineConfig) -> Outcome {
        execute(self.into_operation(config), Outcome::Error)
    }
}

impl std::fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRequest")
            .field("scope", &self.scope)
            .field("processing_threads", &self.processing_threads)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ScanOperation
// ---------------------------------------------------------------------------

/// Root operation of a scan.
pub struct ScanOperation {
    name: String,
    request: ScanRequest,
    config: PipelineConfig,
    progress: Arc<Progress>,
}

impl ScanOperation {
    #[must_use]
    pub fn new(request: ScanRequest, config: PipelineConfig) -> Self {
        Self {
            name: format!("scan:{}", request.scope),
            request,
            config: config.normalized(),
            progress: Arc::new(Progress::new()),
        }
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    async fn scan(&self, ctx: &OperationContext) -> Outcome {
        info!("scan started");
        let listener = Arc::clone(&self.request.listener);
        let pipeline = Pipeline::begin(
            &self.name,
            ctx,
            self.request.processing_threads,
            self.config.heartbeat_interval,
            Arc::clone(&self.progress),
            move |snapshot| listener.on_heartbeat(snapshot),
        );

        let listed = self.list_and_dispatch(ctx, &pipeline).await;
        let completion = pipeline.finish(listed).await;
        if completion.completed {
            self.request.listener.on_scan_complete();
        }

        let snapshot = self.progress.snapshot();
        info!(
            outcome = %completion.outcome,
            listed = snapshot.listed,
            loaded = snapshot.loaded,
            filtered = snapshot.filtered,
            skipped = snapshot.skipped,
            aborted = snapshot.aborted,
            elapsed_ms = snapshot.elapsed_ms,
            "scan finished"
        );
        completion.outcome
    }

    /// Walks every page, dispatching one item per key. Resolves `Stopped` as
    /// soon as a stop is observed.
    async fn list_and_dispatch(
        &self,
        ctx: &OperationContext,
        pipeline: &Pipeline,
    ) -> anyhow::Result<Outcome> {
        let request = &self.request;
        let prefix = request.scope.prefix();
        let mut token: Option<String> = None;
        let mut pages = 0_u64;

        loop {
            if ctx.is_stopped() {
                debug!(pages, "stop observed before page fetch");
                return Ok(Outcome::Stopped);
            }

            let page = request
                .store
                .list_page(prefix, token.as_deref(), self.config.page_size)
                .await
                .with_context(|| format!("listing page {} failed", pages + 1))?;
            pages += 1;
            self.progress.add_listed(page.keys.len());

            for key in page.keys {
                if ctx.is_stopped() {
                    debug!(pages, "stop observed while dispatching");
                    return Ok(Outcome::Stopped);
                }
                let item = ScanItemOperation {
                    key,
                    store: Arc::clone(&request.store),
                    listener: Arc::clone(&request.listener),
                    progress: Arc::clone(&self.progress),
                };
                if !pipeline.dispatch(item).await? {
                    return Ok(Outcome::Stopped);
                }
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => {
                    debug!(pages, "listing exhausted");
                    return Ok(Outcome::Success);
                }
            }
        }
    }
}

#[async_trait]
impl Operation for ScanOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &OperationContext) -> anyhow::Result<Outcome> {
        let span = info_span!(
            "scan",
            run_id = %Uuid::new_v4(),
            scope = %self.request.scope,
            threads = self.request.processing_threads,
        );
        Ok(self.scan(ctx).instrument(span).await)
    }
}

// ---------------------------------------------------------------------------
// ScanItemOperation
// ---------------------------------------------------------------------------

/// Processes one listed object: filter, fetch, hand to the listener.
struct ScanItemOperation {
    key: String,
    store: Arc<dyn ObjectStore>,
    listener: Arc<dyn ScanListener>,
    progress: Arc<Progress>,
}

impl ScanItemOperation {
    /// `None` when a stop was observed before the item finished.
    async fn process(&self, ctx: &OperationContext) -> Option<ItemOutcome> {
        if !self.listener.should_load_object(&self.key) {
            return Some(ItemOutcome::Filtered);
        }
        if ctx.is_stopped() {
            return None;
        }
        let outcome = match self.store.fetch(&self.key).await {
            Ok(payload) => ItemOutcome::from_listener(self.listener.on_load_object(&self.key, payload)),
            Err(err) => ItemOutcome::Skipped(SkipReason::FetchFailed(err.to_string())),
        };
        Some(outcome)
    }
}

#[async_trait]
impl Operation for ScanItemOperation {
    fn name(&self) -> &str {
        "scan-item"
    }

    async fn run(&self, ctx: &OperationContext) -> anyhow::Result<Outcome> {
        if ctx.is_stopped() {
            return Ok(Outcome::Stopped);
        }
        let Some(outcome) = self.process(ctx).await else {
            return Ok(Outcome::Stopped);
        };

        if let ItemOutcome::Skipped(reason) = &outcome {
            debug!(key = %self.key, %reason, "object skipped");
            self.listener.on_object_skipped(&self.key, reason);
        }
        self.progress.record(&outcome);
        outcome.into_result(&self.key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
