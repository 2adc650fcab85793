//! Signal Deduplicator
//!
//! Makes signal handling idempotent under at-least-once delivery: a signal
//! id is admitted exactly once within the retention window. Entries are
//! evicted after the window on the assumption that the messaging layer
//! cannot redeliver beyond it — bounded memory traded against perfect
//! idempotency, with the window configurable (`dedup.retention_secs`).

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Amortize pruning: sweep expired entries once per this many admits.
const PRUNE_EVERY: u64 = 4096;

pub struct SignalDeduplicator {
    seen: DashMap<String, DateTime<Utc>>,
    retention: Duration,
    admits: AtomicU64,
}

impl SignalDeduplicator {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            seen: DashMap::new(),
            retention: Duration::seconds(retention_secs as i64),
            admits: AtomicU64::new(0),
        }
    }

    /// Returns true the first time a signal id is seen within the
    /// retention window, false on every redelivery.
    pub fn admit(&self, signal_id: &str) -> bool {
        let now = Utc::now();
        let admitted = match self.seen.entry(signal_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if now - *entry.get() < self.retention {
                    false
                } else {
                    // Expired entry: the window has passed, treat as new
                    entry.insert(now);
                    true
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        };

        if self.admits.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune(now);
        }
        admitted
    }

    /// Forget an id so a redelivery can be admitted again. Used when the
    /// admitted signal could not be enqueued and the transport will retry.
    pub fn forget(&self, signal_id: &str) {
        self.seen.remove(signal_id);
    }

    /// Seed ids recovered from durable storage, so redelivery across a
    /// process restart stays idempotent for signals whose effects were
    /// already persisted.
    pub fn preload<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, DateTime<Utc>)>,
    {
        for (signal_id, seen_at) in entries {
            self.seen.insert(signal_id, seen_at);
        }
    }

    /// Drop entries older than the retention window.
    fn prune(&self, now: DateTime<Utc>) {
        let retention = self.retention;
        self.seen.retain(|_, seen_at| now - *seen_at < retention);
    }

    /// Number of ids currently tracked, for monitoring.
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_admit_wins_redeliveries_lose() {
        let dedup = SignalDeduplicator::new(3600);
        assert!(dedup.admit("sig-1"));
        assert!(!dedup.admit("sig-1"));
        assert!(!dedup.admit("sig-1"));
        assert!(dedup.admit("sig-2"));
    }

    #[test]
    fn expired_entries_are_readmitted() {
        let dedup = SignalDeduplicator::new(0);
        // Zero retention: every entry is already expired on the next admit
        assert!(dedup.admit("sig-1"));
        assert!(dedup.admit("sig-1"));
    }

    #[test]
    fn prune_drops_expired_entries() {
        let dedup = SignalDeduplicator::new(0);
        for i in 0..10 {
            dedup.admit(&format!("sig-{i}"));
        }
        dedup.prune(Utc::now());
        assert_eq!(dedup.tracked(), 0);
    }
}
