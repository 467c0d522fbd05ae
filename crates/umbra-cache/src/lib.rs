//! # Umbra answer cache
//!
//! Caches the first answer record of successful upstream lookups, keyed
//! by `(query type, canonical name)`, for the TTL the record declares.
//! Expired entries are invisible to readers immediately and are reaped
//! by a periodic sweeper task.
//!
//! The map is two-level (`qtype -> name -> entry`) under a single
//! read-write lock; lookups take the read lock only.

use compact_str::CompactString;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use umbra_proto::ResourceRecord;

/// How often the sweeper scans for expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    record: ResourceRecord,
    expires_at: Instant,
}

/// The in-memory answer cache.
pub struct AnswerCache {
    entries: RwLock<HashMap<u16, HashMap<CompactString, Entry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    cleanups: AtomicU64,
}

impl AnswerCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
        }
    }

    /// Returns the cached record for `(qtype, name)` if it has not
    /// expired. A record stored with TTL 0 is never returned.
    pub fn get(&self, qtype: u16, name: &str) -> Option<ResourceRecord> {
        let now = Instant::now();
        let entries = self.entries.read();

        let record = entries
            .get(&qtype)
            .and_then(|names| names.get(name))
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.record.clone());

        if record.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        record
    }

    /// Stores `record` under `(qtype, name)`, replacing any previous
    /// entry. The deadline is now plus the record's TTL.
    pub fn set(&self, qtype: u16, name: &str, record: ResourceRecord) {
        let expires_at = Instant::now() + Duration::from_secs(u64::from(record.ttl()));

        self.entries
            .write()
            .entry(qtype)
            .or_default()
            .insert(CompactString::from(name), Entry { record, expires_at });
    }

    /// Removes every expired entry.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write();

        for names in entries.values_mut() {
            names.retain(|_, entry| entry.expires_at > now);
        }
        entries.retain(|_, names| !names.is_empty());

        self.cleanups.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of live entries (expired ones included until
    /// the next sweep).
    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns the sweeper task; it runs every minute until `shutdown`
    /// fires.
    pub fn run_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.sweep();
                        debug!(entries = cache.len(), "cache sweep finished");
                    }
                    _ = shutdown.recv() => {
                        debug!("cache sweeper stopping");
                        return;
                    }
                }
            }
        })
    }

    /// Returns a point-in-time stats snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            cleanups: self.cleanups.load(Ordering::Relaxed),
        }
    }
}

impl Default for AnswerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of cache counters for the debug endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Entries currently stored.
    pub count: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed or hit an expired entry.
    pub misses: u64,
    /// Completed sweeps.
    pub cleanups: u64,
}
