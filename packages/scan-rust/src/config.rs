//! Pipeline configuration, injected into scans and loads at construction.

use std::time::Duration;

use driftnet_core::DEFAULT_HEARTBEAT_INTERVAL;

/// Shortest heartbeat period accepted; zero would spin the timer.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Tunables shared by scans and bulk loads.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Keys requested per listing call.
    pub page_size: usize,
    /// Period of `on_heartbeat` callbacks while a pipeline is active.
    pub heartbeat_interval: Duration,
    /// Documents larger than this are skipped without parsing.
    pub max_document_bytes: usize,
}

impl PipelineConfig {
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_document_bytes(mut self, limit: usize) -> Self {
        self.max_document_bytes = limit;
        self
    }

    /// Returns a copy with every field clamped into its valid range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self.heartbeat_interval = self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        self.max_document_bytes = self.max_document_bytes.max(1);
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_document_bytes: 16 * 1024 * 1024, // 16 MiB
        }
    }
}
