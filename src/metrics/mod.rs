//! Lifecycle counters for the node simulator
//!
//! The lifecycle service reports outcomes here that never reach the caller's
//! return value, most importantly failed best-effort cleanups of device
//! metadata records. Counters are atomics so handlers can share one
//! collector without locking.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters updated by the lifecycle service
#[derive(Debug, Default)]
pub struct LifecycleMetrics {
    nodes_created: AtomicU64,
    nodes_updated: AtomicU64,
    nodes_deleted: AtomicU64,
    rollbacks: AtomicU64,
    compensation_failures: AtomicU64,
    cleanup_failures: AtomicU64,
    cancellations: AtomicU64,
}

/// Point-in-time view of [`LifecycleMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "nodesCreated")]
    pub nodes_created: u64,

    #[serde(rename = "nodesUpdated")]
    pub nodes_updated: u64,

    #[serde(rename = "nodesDeleted")]
    pub nodes_deleted: u64,

    /// Node records removed after their device metadata create failed
    pub rollbacks: u64,

    /// Rollbacks that themselves failed, leaving an orphaned node record
    #[serde(rename = "compensationFailures")]
    pub compensation_failures: u64,

    /// Device metadata deletes that failed during node deletion
    #[serde(rename = "cleanupFailures")]
    pub cleanup_failures: u64,

    pub cancellations: u64,
}

impl LifecycleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_created(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_updated(&self) {
        self.nodes_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.nodes_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compensation_failure(&self) {
        self.compensation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cleanup_failure(&self) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            nodes_updated: self.nodes_updated.load(Ordering::Relaxed),
            nodes_deleted: self.nodes_deleted.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            compensation_failures: self.compensation_failures.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }
}
