//! Bulk load of newline-delimited JSON documents.
//!
//! The source is framed into lines on the load's own task; every non-blank
//! line becomes a [`DocumentItemOperation`] that parses it into the
//! listener's document type and hands it over. Line numbers are 1-based and
//! count blank lines, so they match what an editor shows.
//!
//! Framing never buffers more than `max_document_bytes` of one line: a
//! longer line is discarded up to its newline and reported as oversized.
//! Every read races the stop token, so a stop lands even mid-line.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use driftnet_core::{execute, Operation, OperationContext, Outcome, StopToken};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::item::{ItemOutcome, SkipReason};
use crate::listener::BulkLoadListener;
use crate::pipeline::Pipeline;
use crate::progress::{Progress, ProgressSnapshot};
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// DocumentSource
// ---------------------------------------------------------------------------

/// Bytes requested from the source per read.
const READ_CHUNK: usize = 8 * 1024;

/// A readable stream of newline-delimited documents.
pub struct DocumentSource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    label: String,
}

impl DocumentSource {
    pub fn from_reader<R>(reader: R, label: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            label: label.into(),
        }
    }

    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self::from_reader(std::io::Cursor::new(body.into()), "<bytes>")
    }

    /// Opens a local file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::from_reader(file, path.display().to_string()))
    }

    /// Fetches one object and reads it as a document stream.
    ///
    /// # Errors
    ///
    /// Returns the store error if the object cannot be fetched.
    pub async fn from_store(store: &dyn ObjectStore, key: &str) -> Result<Self, crate::error::StoreError> {
        let body = store.fetch(key).await?;
        Ok(Self::from_reader(std::io::Cursor::new(body), key))
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSource")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// BulkLoadRequest
// ---------------------------------------------------------------------------

/// Description of one bulk load.
pub struct BulkLoadRequest<L: BulkLoadListener> {
    source: DocumentSource,
    listener: Arc<L>,
    processing_threads: usize,
}

impl<L: BulkLoadListener> BulkLoadRequest<L> {
    /// `processing_threads` below 1 is clamped to 1.
    pub fn new(source: DocumentSource, listener: Arc<L>, processing_threads: usize) -> Self {
        Self {
            source,
            listener,
            processing_threads: processing_threads.max(1),
        }
    }

    #[must_use]
    pub fn processing_threads(&self) -> usize {
        self.processing_threads
    }

    #[must_use]
    pub fn into_operation(self, config: PipelineConfig) -> BulkLoadOperation<L> {
        BulkLoadOperation::new(self, config)
    }

    /// Runs the load on a fresh runtime, blocking until every document is done.
    #[must_use]
    pub fn execute(self, config: PipelineConfig) -> Outcome {
        execute(self.into_operation(config), Outcome::Error)
    }
}

// ---------------------------------------------------------------------------
// BulkLoadOperation
// ---------------------------------------------------------------------------

/// Root operation of a bulk load. The source is consumed by the first run.
pub struct BulkLoadOperation<L: BulkLoadListener> {
    name: String,
    source: Mutex<Option<DocumentSource>>,
    listener: Arc<L>,
    processing_threads: usize,
    config: PipelineConfig,
    progress: Arc<Progress>,
}

impl<L: BulkLoadListener> BulkLoadOperation<L> {
    #[must_use]
    pub fn new(request: BulkLoadRequest<L>, config: PipelineConfig) -> Self {
        Self {
            name: format!("load:{}", request.source.label),
            source: Mutex::new(Some(request.source)),
            listener: request.listener,
            processing_threads: request.processing_threads,
            config: config.normalized(),
            progress: Arc::new(Progress::new()),
        }
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    async fn load(&self, ctx: &OperationContext, source: DocumentSource) -> Outcome {
        info!("load started");
        let listener = Arc::clone(&self.listener);
        let pipeline = Pipeline::begin(
            &self.name,
            ctx,
            self.processing_threads,
            self.config.heartbeat_interval,
            Arc::clone(&self.progress),
            move |snapshot| listener.on_heartbeat(snapshot),
        );

        let read = self.read_and_dispatch(ctx, &pipeline, source).await;
        let completion = pipeline.finish(read).await;
        if completion.completed {
            self.listener.on_load_complete();
        }

        let snapshot = self.progress.snapshot();
        info!(
            outcome = %completion.outcome,
            lines = snapshot.listed,
            loaded = snapshot.loaded,
            filtered = snapshot.filtered,
            skipped = snapshot.skipped,
            aborted = snapshot.aborted,
            elapsed_ms = snapshot.elapsed_ms,
            "load finished"
        );
        completion.outcome
    }

    async fn read_and_dispatch(
        &self,
        ctx: &OperationContext,
        pipeline: &Pipeline,
        source: DocumentSource,
    ) -> anyhow::Result<Outcome> {
        let limit = self.config.max_document_bytes;
        let label = source.label;
        let mut lines = LineFramer::new(source.reader, limit);
        let mut line_no = 0_u64;
        loop {
            if ctx.is_stopped() {
                debug!(line = line_no, "stop observed while reading");
                return Ok(Outcome::Stopped);
            }

            let frame = lines
                .next_frame(ctx.stop_token())
                .await
                .with_context(|| format!("reading {label} after line {line_no}"))?;
            let body = match frame {
                Frame::Line(body) => body,
                Frame::Oversized => {
                    line_no += 1;
                    self.skip_oversized(line_no, limit);
                    continue;
                }
                Frame::Stopped => {
                    debug!(line = line_no, "stop observed while reading");
                    return Ok(Outcome::Stopped);
                }
                Frame::End => {
                    debug!(lines = line_no, "source exhausted");
                    return Ok(Outcome::Success);
                }
            };
            line_no += 1;

            let body = trim_line_end(body);
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.progress.add_listed(1);

            let item = DocumentItemOperation {
                line: line_no,
                body,
                listener: Arc::clone(&self.listener),
                progress: Arc::clone(&self.progress),
            };
            if !pipeline.dispatch(item).await? {
                return Ok(Outcome::Stopped);
            }
        }
    }

    /// Oversized lines never reach the pool; they are reported from here.
    fn skip_oversized(&self, line: u64, limit: usize) {
        let reason = SkipReason::Oversized { limit };
        debug!(line, %reason, "document skipped");
        self.progress.add_listed(1);
        self.listener.on_document_skipped(line, &reason);
        self.progress.record(&ItemOutcome::Skipped(reason));
    }
}

#[async_trait]
impl<L: BulkLoadListener> Operation for BulkLoadOperation<L> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &OperationContext) -> anyhow::Result<Outcome> {
        let source = self
            .source
            .lock()
            .take()
            .context("document source was already consumed")?;
        let span = info_span!(
            "load",
            run_id = %Uuid::new_v4(),
            source = %source.label,
            threads = self.processing_threads,
        );
        Ok(self.load(ctx, source).instrument(span).await)
    }
}

fn trim_line_end(mut line: Bytes) -> Bytes {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}

// ---------------------------------------------------------------------------
// LineFramer
// ---------------------------------------------------------------------------

enum Frame {
    /// One line, without its newline.
    Line(Bytes),
    /// A line longer than the limit; its bytes were dropped.
    Oversized,
    Stopped,
    End,
}

/// Splits a reader into newline-terminated lines with a bounded buffer.
struct LineFramer {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    codec: AnyDelimiterCodec,
    buf: BytesMut,
    eof: bool,
}

impl LineFramer {
    fn new(reader: Box<dyn AsyncRead + Send + Unpin>, max_line_bytes: usize) -> Self {
        Self {
            reader,
            codec: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_line_bytes),
            buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    async fn next_frame(&mut self, stop: &StopToken) -> std::io::Result<Frame> {
        loop {
            let decoded = if self.eof {
                self.codec.decode_eof(&mut self.buf)
            } else {
                self.codec.decode(&mut self.buf)
            };
            match decoded {
                Ok(Some(line)) => return Ok(Frame::Line(line)),
                Ok(None) if self.eof => return Ok(Frame::End),
                Ok(None) => {}
                // The codec keeps discarding up to the next newline on later calls.
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => return Ok(Frame::Oversized),
                Err(err) => return Err(std::io::Error::other(err)),
            }

            self.buf.reserve(READ_CHUNK);
            tokio::select! {
                biased;
                () = stop.stopped() => return Ok(Frame::Stopped),
                read = self.reader.read_buf(&mut self.buf) => {
                    if read? == 0 {
                        self.eof = true;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentItemOperation
// ---------------------------------------------------------------------------

/// Parses and delivers one line.
struct DocumentItemOperation<L: BulkLoadListener> {
    line: u64,
    body: Bytes,
    listener: Arc<L>,
    progress: Arc<Progress>,
}

impl<L: BulkLoadListener> DocumentItemOperation<L> {
    fn process(&self) -> ItemOutcome {
        let document: L::Document = match serde_json::from_slice(&self.body) {
            Ok(document) => document,
            Err(err) => return ItemOutcome::Skipped(SkipReason::ParseFailed(err.to_string())),
        };
        if !self.listener.should_load_document(&document) {
            return ItemOutcome::Filtered;
        }
        ItemOutcome::from_listener(self.listener.on_load_document(self.line, document))
    }
}

#[async_trait]
impl<L: BulkLoadListener> Operation for DocumentItemOperation<L> {
    fn name(&self) -> &str {
        "load-document"
    }

    async fn run(&self, ctx: &OperationContext) -> anyhow::Result<Outcome> {
        if ctx.is_stopped() {
            return Ok(Outcome::Stopped);
        }
        let outcome = self.process();
        if let ItemOutcome::Skipped(reason) = &outcome {
            debug!(line = self.line, %reason, "document skipped");
            self.listener.on_document_skipped(self.line, reason);
        }
        self.progress.record(&outcome);
        outcome.into_result(&format!("line {}", self.line))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
