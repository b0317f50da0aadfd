//! `driftnet` Scan: paginated object-store scans and bulk document loads.
//!
//! Both pipelines are composite [`Operation`](driftnet_core::Operation)s: a
//! single producer (page listing or line reading) feeds per-item operations
//! into a bounded child pool, while a heartbeat reports progress to the
//! caller's listener. Item-level failures are skipped; listing failures and
//! aborted items fail the whole run.

pub mod config;
pub mod error;
pub mod item;
pub mod listener;
pub mod loader;
pub mod logging;
pub(crate) mod pipeline;
pub mod progress;
pub mod scan;
pub mod scope;
pub mod store;
pub mod stores;

pub use config::PipelineConfig;
pub use error::{ItemError, RequestError, StoreError};
pub use item::{ItemOutcome, SkipReason};
pub use listener::{BulkLoadListener, ScanListener};
pub use loader::{BulkLoadOperation, BulkLoadRequest, DocumentSource};
pub use logging::init_tracing;
pub use progress::{Progress, ProgressSnapshot};
pub use scan::{ScanOperation, ScanRequest};
pub use scope::Scope;
pub use store::{ListPage, ObjectStore};
pub use stores::{DirStore, MemoryStore};
