//! Typed result of processing one listed object or one document.
//!
//! Skipping versus aborting is carried as data: item-level failures become
//! [`ItemOutcome::Skipped`] and never change the aggregate, while
//! [`ItemOutcome::Aborted`] fails that item's operation.

use std::fmt;

use driftnet_core::Outcome;

use crate::error::ItemError;

/// Why an item was dropped without being loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The store could not return the object body.
    FetchFailed(String),
    /// The document did not deserialize.
    ParseFailed(String),
    /// The line exceeded the configured size limit and was discarded unread.
    Oversized { limit: usize },
    /// The listener refused the payload.
    Rejected(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FetchFailed(msg) => write!(f, "fetch failed: {msg}"),
            SkipReason::ParseFailed(msg) => write!(f, "parse failed: {msg}"),
            SkipReason::Oversized { limit } => write!(f, "document exceeds limit of {limit} bytes"),
            SkipReason::Rejected(msg) => write!(f, "rejected: {msg}"),
        }
    }
}

/// Result of the per-item step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Loaded,
    /// The listener's predicate declined the item.
    Filtered,
    Skipped(SkipReason),
    Aborted(String),
}

impl ItemOutcome {
    /// Maps a listener load result onto an item outcome.
    #[must_use]
    pub fn from_listener(result: Result<(), ItemError>) -> Self {
        match result {
            Ok(()) => ItemOutcome::Loaded,
            Err(ItemError::Skip(err)) => ItemOutcome::Skipped(SkipReason::Rejected(format!("{err:#}"))),
            Err(ItemError::Abort(err)) => ItemOutcome::Aborted(format!("{err:#}")),
        }
    }

    /// Converts into the item operation's result: everything but `Aborted`
    /// is a success.
    ///
    /// # Errors
    ///
    /// Returns an error carrying the abort reason for `Aborted`.
    pub fn into_result(self, item: &str) -> anyhow::Result<Outcome> {
        match self {
            ItemOutcome::Aborted(reason) => Err(anyhow::anyhow!("item {item} aborted: {reason}")),
            _ => Ok(Outcome::Success),
        }
    }
}
