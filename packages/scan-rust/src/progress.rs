//! Live counters for a running pipeline, reported through heartbeats.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::item::ItemOutcome;

/// Atomic progress counters shared by a pipeline and its item operations.
#[derive(Debug)]
pub struct Progress {
    started: Instant,
    listed: AtomicU64,
    dispatched: AtomicU64,
    loaded: AtomicU64,
    filtered: AtomicU64,
    skipped: AtomicU64,
    aborted: AtomicU64,
}

/// Point-in-time copy of [`Progress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub listed: u64,
    pub dispatched: u64,
    pub loaded: u64,
    pub filtered: u64,
    pub skipped: u64,
    pub aborted: u64,
    pub elapsed_ms: u64,
}

impl ProgressSnapshot {
    /// Items that reached a terminal per-item outcome.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.loaded + self.filtered + self.skipped + self.aborted
    }
}

impl Progress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            listed: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            loaded: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    pub fn add_listed(&self, count: usize) {
        self.listed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: &ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Loaded => &self.loaded,
            ItemOutcome::Filtered => &self.filtered,
            ItemOutcome::Skipped(_) => &self.skipped,
            ItemOutcome::Aborted(_) => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        ProgressSnapshot {
            listed: self.listed.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            loaded: self.loaded.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            elapsed_ms,
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}
