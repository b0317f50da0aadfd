//! `driftnet` command-line entry point.
//!
//! Runs a scan over a directory tree or a bulk load of an NDJSON file and
//! prints a JSON summary of the run on stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use driftnet_core::{drive, Operation, Outcome, Stoppable, Stopper, Task};
use driftnet_scan::{
    init_tracing, BulkLoadListener, BulkLoadRequest, DirStore, DocumentSource, ItemError,
    PipelineConfig, ProgressSnapshot, ScanListener, ScanRequest, SkipReason,
};
use serde::{Serialize, Serializer};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "driftnet")]
#[command(about = "Scan object stores and bulk-load documents with bounded concurrency")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    #[arg(short, long, env = "DRIFTNET_LOG", default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Visit every file under a directory whose relative path matches a scope.
    Scan(ScanArgs),
    /// Read an NDJSON file and parse every line.
    Load(LoadArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Worker tasks processing items concurrently.
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Stop the run after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Heartbeat period in milliseconds.
    #[arg(long, default_value_t = 1000)]
    heartbeat_ms: u64,
}

#[derive(Args)]
struct ScanArgs {
    /// Directory acting as the object store.
    #[arg(long)]
    root: PathBuf,

    /// Key prefix to scan, or `*` for everything.
    #[arg(long, default_value = "*")]
    scope: String,

    /// Keys requested per listing call.
    #[arg(long, env = "DRIFTNET_PAGE_SIZE", default_value_t = 1000)]
    page_size: usize,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct LoadArgs {
    /// NDJSON file to load.
    #[arg(long)]
    file: PathBuf,

    /// Lines longer than this many bytes are skipped.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    max_document_bytes: usize,

    #[command(flatten)]
    run: RunArgs,
}

impl RunArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default().with_heartbeat_interval(Duration::from_millis(self.heartbeat_ms))
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tally {
    items: AtomicU64,
    bytes: AtomicU64,
    skipped: AtomicU64,
}

impl Tally {
    fn add(&self, bytes: usize) {
        self.items.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn report(progress: &ProgressSnapshot) {
        info!(
            listed = progress.listed,
            processed = progress.processed(),
            skipped = progress.skipped,
            elapsed_ms = progress.elapsed_ms,
            "progress"
        );
    }
}

impl ScanListener for Tally {
    fn on_load_object(&self, _key: &str, payload: Bytes) -> Result<(), ItemError> {
        self.add(payload.len());
        Ok(())
    }

    fn on_object_skipped(&self, key: &str, reason: &SkipReason) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        warn!(key, %reason, "object skipped");
    }

    fn on_heartbeat(&self, progress: &ProgressSnapshot) {
        Tally::report(progress);
    }
}

impl BulkLoadListener for Tally {
    type Document = serde_json::Value;

    fn on_load_document(&self, _line: u64, document: serde_json::Value) -> Result<(), ItemError> {
        self.add(document.to_string().len());
        Ok(())
    }

    fn on_document_skipped(&self, line: u64, reason: &SkipReason) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        warn!(line, %reason, "document skipped");
    }

    fn on_heartbeat(&self, progress: &ProgressSnapshot) {
        Tally::report(progress);
    }
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Summary {
    #[serde(serialize_with = "outcome_name")]
    outcome: Outcome,
    timed_out: bool,
    items: u64,
    bytes: u64,
    skipped: u64,
    progress: ProgressSnapshot,
}

fn outcome_name<S: Serializer>(outcome: &Outcome, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(outcome.as_str())
}

/// Runs `op` as a root task, honouring the time limit and Ctrl-C.
async fn run_root<O, F>(op: Arc<O>, run: &RunArgs, tally: &Tally, progress: F) -> Summary
where
    O: Operation,
    F: Fn(&O) -> ProgressSnapshot,
{
    let task = Task::from_arc(Arc::clone(&op) as Arc<dyn Operation>);

    let stopper = run
        .timeout_secs
        .map(|secs| Stopper::arm(Arc::clone(&task) as Arc<dyn Stoppable>, Duration::from_secs(secs)));

    let interrupt = {
        let task = Arc::clone(&task);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping");
                task.stop();
            }
        })
    };

    let outcome = drive(&task, Outcome::Error).await;
    interrupt.abort();
    let timed_out = stopper.as_ref().is_some_and(Stopper::fired);
    if let Some(stopper) = &stopper {
        stopper.disarm();
    }

    Summary {
        outcome,
        timed_out,
        items: tally.items.load(Ordering::Relaxed),
        bytes: tally.bytes.load(Ordering::Relaxed),
        skipped: tally.skipped.load(Ordering::Relaxed),
        progress: progress(op.as_ref()),
    }
}

async fn scan(args: ScanArgs) -> anyhow::Result<Summary> {
    let tally = Arc::new(Tally::default());
    let request = ScanRequest::new(
        Arc::new(DirStore::new(args.root.clone())),
        &args.scope,
        Arc::clone(&tally) as Arc<dyn ScanListener>,
        args.run.threads,
    )?;
    let config = args.run.pipeline_config().with_page_size(args.page_size);
    let op = Arc::new(request.into_operation(config));
    Ok(run_root(op, &args.run, &tally, driftnet_scan::ScanOperation::progress).await)
}

async fn load(args: LoadArgs) -> anyhow::Result<Summary> {
    let tally = Arc::new(Tally::default());
    let source = DocumentSource::open(&args.file).await?;
    let request = BulkLoadRequest::new(source, Arc::clone(&tally), args.run.threads);
    let config = args
        .run
        .pipeline_config()
        .with_max_document_bytes(args.max_document_bytes);
    let op = Arc::new(request.into_operation(config));
    Ok(run_root(op, &args.run, &tally, driftnet_scan::BulkLoadOperation::progress).await)
}

fn exit_status(outcome: Outcome) -> u8 {
    match outcome {
        Outcome::Success => 0,
        Outcome::Error => 1,
        Outcome::Stopped => 2,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs)?;

    let summary = match cli.command {
        Command::Scan(args) => scan(args).await?,
        Command::Load(args) => load(args).await?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::from(exit_status(summary.outcome)))
}
