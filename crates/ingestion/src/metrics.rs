//! Normalizer counters

use std::sync::atomic::{AtomicU64, Ordering};

use crate::IngestionError;

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total payloads seen
    pub received: AtomicU64,

    /// Payloads turned into canonical records
    pub normalized: AtomicU64,

    /// Invalid JSON or non-object payloads
    pub parse_errors: AtomicU64,

    /// Payloads without a usable position
    pub invalid_positions: AtomicU64,

    /// Messages with an empty body
    pub empty_bodies: AtomicU64,

    /// Records whose timestamp fell back to the wall clock
    pub timestamp_fallbacks: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_normalized(&self, timestamp_from_source: bool) {
        self.normalized.fetch_add(1, Ordering::Relaxed);
        if !timestamp_from_source {
            self.timestamp_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a rejection under its category
    pub fn record_rejected(&self, error: &IngestionError) {
        let counter = match error {
            IngestionError::EmptyBody { .. } => &self.empty_bodies,
            IngestionError::ParseFailed { .. } | IngestionError::NotAnObject { .. } => {
                &self.parse_errors
            }
            IngestionError::InvalidPosition { .. } => &self.invalid_positions,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            normalized: self.normalized.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            invalid_positions: self.invalid_positions.load(Ordering::Relaxed),
            empty_bodies: self.empty_bodies.load(Ordering::Relaxed),
            timestamp_fallbacks: self.timestamp_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub normalized: u64,
    pub parse_errors: u64,
    pub invalid_positions: u64,
    pub empty_bodies: u64,
    pub timestamp_fallbacks: u64,
}

impl MetricsSnapshot {
    /// All rejected payloads
    pub fn rejected(&self) -> u64 {
        self.parse_errors + self.invalid_positions + self.empty_bodies
    }
}
