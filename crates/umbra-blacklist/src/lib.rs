//! # Umbra blacklist
//!
//! A concurrent set of canonicalized domain names, sharded so that the
//! membership test on the query hot path never waits behind a bulk
//! insert from a source refresh. Each shard owns its own read-write
//! lock; a 64-bit hash of the canonical name picks the shard.
//!
//! Canonical form: surrounding whitespace trimmed, lowercased, with a
//! trailing dot. Canonicalization is idempotent, and empty input has no
//! canonical form.

use compact_str::CompactString;
use parking_lot::RwLock;
use rustc_hash::{FxHashSet, FxHasher};
use serde::Serialize;
use std::hash::Hasher;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 256;

/// Canonicalizes a domain name.
///
/// Returns `None` if the input is empty after trimming. Applying the
/// function to its own output returns the same string.
pub fn canonical(domain: &str) -> Option<CompactString> {
    let trimmed = domain.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut name = CompactString::with_capacity(trimmed.len() + 1);
    for c in trimmed.chars() {
        name.extend(c.to_lowercase());
    }
    if !name.ends_with('.') {
        name.push('.');
    }
    Some(name)
}

struct Shard {
    domains: RwLock<FxHashSet<CompactString>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            domains: RwLock::new(FxHashSet::default()),
        }
    }

    fn len(&self) -> usize {
        self.domains.read().len()
    }
}

/// The sharded blocklist.
pub struct Blacklist {
    shards: Vec<Shard>,
    /// Mask applied to the name hash; shard count is a power of two.
    mask: u64,
    domains: AtomicI64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Blacklist {
    /// Creates an empty blacklist with `shards` shards, rounded up to
    /// the next power of two.
    pub fn new(shards: usize) -> Self {
        let count = shards.max(1).next_power_of_two();
        Self {
            shards: (0..count).map(|_| Shard::new()).collect(),
            mask: (count - 1) as u64,
            domains: AtomicI64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn shard_for(&self, name: &str) -> &Shard {
        let mut hasher = FxHasher::default();
        hasher.write(name.as_bytes());
        &self.shards[(hasher.finish() & self.mask) as usize]
    }

    /// Inserts domains, returning how many inputs had a canonical form.
    ///
    /// The count includes domains that were already present; callers use
    /// it for logging, not for set arithmetic.
    pub fn add<I, S>(&self, domains: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0;
        for domain in domains {
            let Some(name) = canonical(domain.as_ref()) else {
                continue;
            };
            self.shard_for(&name).domains.write().insert(name);
            self.domains.fetch_add(1, Ordering::Relaxed);
            count += 1;
        }
        count
    }

    /// Removes domains, returning how many inputs had a canonical form.
    pub fn remove<I, S>(&self, domains: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0;
        for domain in domains {
            let Some(name) = canonical(domain.as_ref()) else {
                continue;
            };
            self.shard_for(&name).domains.write().remove(&name);
            self.domains.fetch_sub(1, Ordering::Relaxed);
            count += 1;
        }
        count
    }

    /// Membership test on the canonical form of `domain`.
    pub fn has(&self, domain: &str) -> bool {
        let Some(name) = canonical(domain) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let found = self.shard_for(&name).domains.read().contains(&name);
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Returns the number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns a point-in-time stats snapshot.
    pub fn stats(&self) -> BlacklistStats {
        let width = self.shards.len().to_string().len();
        let shards = self
            .shards
            .iter()
            .enumerate()
            .map(|(i, shard)| format!("{:0width$}:{}", i, shard.len(), width = width))
            .collect();

        BlacklistStats {
            domains: self.domains.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            shards,
        }
    }
}

/// Snapshot of blacklist counters for the debug endpoint.
///
/// `domains` counts add calls, mirroring the return-value semantics of
/// [`Blacklist::add`]; shard entries are `index:len` strings.
#[derive(Debug, Clone, Serialize)]
pub struct BlacklistStats {
    /// Total domains added minus removed (by call, not by set size).
    pub domains: i64,
    /// Membership tests that found the name.
    pub hits: u64,
    /// Membership tests that did not.
    pub misses: u64,
    /// Per-shard sizes, zero-padded `index:len`.
    pub shards: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn canonical_is_idempotent() {
        for input in ["example.com", "  Example.COM. ", "a", "ads.test."] {
            let once = canonical(input).unwrap();
            let twice = canonical(&once).unwrap();
            assert_eq!(once, twice);
            assert!(once.ends_with('.'));
        }
    }

    #[test]
    fn canonical_rejects_blank_input() {
        assert_eq!(canonical(""), None);
        assert_eq!(canonical("   "), None);
        assert_eq!(canonical("\t\n"), None);
    }

    #[test]
    fn add_has_remove() {
        let blacklist = Blacklist::new(8);

        assert_eq!(blacklist.add(["ads.test"]), 1);
        assert!(blacklist.has("ads.test"));
        assert!(blacklist.has("ads.test."));
        assert!(blacklist.has("ADS.TEST"));
        assert!(!blacklist.has("other.test"));

        assert_eq!(blacklist.remove(["ads.test."]), 1);
        assert!(!blacklist.has("ads.test"));
    }

    #[test]
    fn blank_inputs_do_not_count() {
        let blacklist = Blacklist::new(8);
        assert_eq!(blacklist.add([""]), 0);
        assert_eq!(blacklist.add(["  "]), 0);
        assert!(!blacklist.has(""));
        assert!(!blacklist.has("  "));
    }

    #[test]
    fn re_adding_still_counts() {
        let blacklist = Blacklist::new(8);
        assert_eq!(blacklist.add(["ads.test", "ads.test"]), 2);
        assert!(blacklist.has("ads.test"));
    }

    #[test]
    fn shard_count_rounds_to_power_of_two() {
        assert_eq!(Blacklist::new(200).shard_count(), 256);
        assert_eq!(Blacklist::new(256).shard_count(), 256);
        assert_eq!(Blacklist::new(1).shard_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_adds_are_all_visible() {
        const TASKS: usize = 16;
        const PER_TASK: usize = 500;

        let blacklist = Arc::new(Blacklist::new(DEFAULT_SHARDS));

        let mut handles = Vec::new();
        for task in 0..TASKS {
            let blacklist = blacklist.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..PER_TASK {
                    blacklist.add([format!("host-{task}-{i}.test")]);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for task in 0..TASKS {
            for i in 0..PER_TASK {
                assert!(blacklist.has(&format!("host-{task}-{i}.test")));
            }
        }
    }

    #[test]
    fn stats_snapshot() {
        let blacklist = Blacklist::new(4);
        blacklist.add(["a.test", "b.test", "c.test"]);
        blacklist.has("a.test");
        blacklist.has("missing.test");

        let stats = blacklist.stats();
        assert_eq!(stats.domains, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.shards.len(), 4);

        let total: usize = stats
            .shards
            .iter()
            .map(|s| s.split(':').nth(1).unwrap().parse::<usize>().unwrap())
            .sum();
        assert_eq!(total, 3);
    }
}
