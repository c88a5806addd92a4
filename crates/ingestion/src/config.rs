//! Ingestion metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics, shared by every source of a pipeline
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Frames published and delivered to the sink
    pub frames_produced: AtomicU64,

    /// Frames the archive refused to publish
    pub frames_refused: AtomicU64,

    /// Frames that could not be assembled
    pub build_errors: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record frame delivered
    pub fn record_produced(&self) {
        self.frames_produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record publish refusal
    pub fn record_refused(&self) {
        self.frames_refused.fetch_add(1, Ordering::Relaxed);
    }

    /// Record build error
    pub fn record_build_error(&self) {
        self.build_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_produced: self.frames_produced.load(Ordering::Relaxed),
            frames_refused: self.frames_refused.load(Ordering::Relaxed),
            build_errors: self.build_errors.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_produced: u64,
    pub frames_refused: u64,
    pub build_errors: u64,
}

impl MetricsSnapshot {
    /// Frames that never reached the sink
    pub fn frames_dropped(&self) -> u64 {
        self.frames_refused + self.build_errors
    }
}
