//! Caller-supplied callbacks for scans and bulk loads.
//!
//! Listeners are invoked from arbitrary worker tasks with no framework-side
//! serialization, so implementations must be thread-safe.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::ItemError;
use crate::item::SkipReason;
use crate::progress::ProgressSnapshot;

/// Receives the objects visited by a scan.
pub trait ScanListener: Send + Sync + 'static {
    /// Cheap predicate deciding whether the object body is fetched at all.
    fn should_load_object(&self, _key: &str) -> bool {
        true
    }

    /// Called with the body of every object that passed the predicate and
    /// was fetched successfully.
    ///
    /// # Errors
    ///
    /// [`ItemError::Skip`] drops the object; [`ItemError::Abort`] fails it.
    fn on_load_object(&self, key: &str, payload: Bytes) -> Result<(), ItemError>;

    /// Called when an object is dropped, with the reason.
    fn on_object_skipped(&self, _key: &str, _reason: &SkipReason) {}

    /// Called roughly once per heartbeat interval while the scan is active.
    fn on_heartbeat(&self, _progress: &ProgressSnapshot) {}

    /// Called once, after the listing finished and every dispatched object
    /// was processed. Not called for stopped scans or failed listings.
    fn on_scan_complete(&self) {}
}

/// Receives the documents read by a bulk load.
pub trait BulkLoadListener: Send + Sync + 'static {
    /// Type each input line is deserialized into.
    type Document: DeserializeOwned + Send + 'static;

    fn should_load_document(&self, _document: &Self::Document) -> bool {
        true
    }

    /// Called with every parsed document that passed the predicate.
    /// `line` is the 1-based line number in the source.
    ///
    /// # Errors
    ///
    /// [`ItemError::Skip`] drops the document; [`ItemError::Abort`] fails it.
    fn on_load_document(&self, line: u64, document: Self::Document) -> Result<(), ItemError>;

    fn on_document_skipped(&self, _line: u64, _reason: &SkipReason) {}

    fn on_heartbeat(&self, _progress: &ProgressSnapshot) {}

    /// Called once, after the source was fully read and every dispatched
    /// document was processed.
    fn on_load_complete(&self) {}
}
