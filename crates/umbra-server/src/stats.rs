//! Per-outcome query counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the four terminal pipeline branches.
#[derive(Debug, Default)]
pub struct ServerStats {
    blocked: AtomicU64,
    resolved: AtomicU64,
    failed: AtomicU64,
    cached: AtomicU64,
}

impl ServerStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a synthetic blocked reply.
    pub fn inc_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a forwarded and answered query.
    pub fn inc_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a SERVFAIL reply.
    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a cache-served reply.
    pub fn inc_cached(&self) {
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocked: self.blocked.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the query counters for the debug endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    /// Queries answered with a synthetic loopback record.
    pub blocked: u64,
    /// Queries forwarded and answered by an upstream.
    pub resolved: u64,
    /// Queries answered SERVFAIL.
    pub failed: u64,
    /// Queries served from the answer cache.
    pub cached: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ServerStats::new();
        stats.inc_blocked();
        stats.inc_blocked();
        stats.inc_resolved();
        stats.inc_cached();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.blocked, 2);
        assert_eq!(snapshot.resolved, 1);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.cached, 1);
    }
}
