//! Replication metrics
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters of one replication consumer
///
/// Relaxed ordering: counters are read for reporting, never to
/// synchronize.
#[derive(Debug, Default)]
pub struct ReplicationMetrics {
    /// Events-stream records applied
    events_applied: AtomicU64,
    /// Control records applied by a replica
    controls_applied: AtomicU64,
    /// Control messages published by a leader
    controls_published: AtomicU64,
    /// Successful offset commits
    commits: AtomicU64,
    /// Poll failures other than wakeups
    poll_failures: AtomicU64,
    /// Failed offset commits
    commit_failures: AtomicU64,
    /// Subscription rebuilds
    restarts: AtomicU64,
    /// Snapshots persisted by the leader
    snapshots: AtomicU64,
}

impl ReplicationMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_events_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_controls_applied(&self) {
        self.controls_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_controls_published(&self) {
        self.controls_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_poll_failures(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commit_failures(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_restarts(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_snapshots(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            controls_applied: self.controls_applied.load(Ordering::Relaxed),
            controls_published: self.controls_published.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
        }
    }

    /// Get all counters as JSON
    pub fn to_json(&self) -> String {
        // Serializing plain integers cannot fail.
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub events_applied: u64,
    pub controls_applied: u64,
    pub controls_published: u64,
    pub commits: u64,
    pub poll_failures: u64,
    pub commit_failures: u64,
    pub restarts: u64,
    pub snapshots: u64,
}
