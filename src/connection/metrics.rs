use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of physical actions performed by the connections of one pool
///
/// Logical participants never touch these; only new physical transactions
/// and savepoints do.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    savepoints_created: AtomicU64,
    savepoints_released: AtomicU64,
    savepoint_rollbacks: AtomicU64,
}

/// Point-in-time copy of [`ConnectionMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub savepoints_created: u64,
    pub savepoints_released: u64,
    pub savepoint_rollbacks: u64,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_begin(&self) {
        self.begins.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_savepoint(&self) {
        self.savepoints_created.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_savepoint_release(&self) {
        self.savepoints_released.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_savepoint_rollback(&self) {
        self.savepoint_rollbacks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            begins: self.begins.load(Ordering::SeqCst),
            commits: self.commits.load(Ordering::SeqCst),
            rollbacks: self.rollbacks.load(Ordering::SeqCst),
            savepoints_created: self.savepoints_created.load(Ordering::SeqCst),
            savepoints_released: self.savepoints_released.load(Ordering::SeqCst),
            savepoint_rollbacks: self.savepoint_rollbacks.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "begins={} commits={} rollbacks={} savepoints={}/{}/{}",
            self.begins,
            self.commits,
            self.rollbacks,
            self.savepoints_created,
            self.savepoints_released,
            self.savepoint_rollbacks
        )
    }
}
