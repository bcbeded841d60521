//! Counters kept by the watcher worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for the watcher worker.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub records_read: AtomicU64,
    pub records_skipped: AtomicU64,
    pub events_forwarded: AtomicU64,
    pub events_synthesized: AtomicU64,
    pub watches_added: AtomicU64,
    pub watches_removed: AtomicU64,
}

impl WatcherStats {
    /// Create a new shared stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_sent(&self, synthesized: bool) {
        if synthesized {
            self.events_synthesized.fetch_add(1, Ordering::Relaxed);
        } else {
            self.events_forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn watch_added(&self) {
        self.watches_added.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn watches_removed(&self, count: usize) {
        self.watches_removed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            events_synthesized: self.events_synthesized.load(Ordering::Relaxed),
            watches_added: self.watches_added.load(Ordering::Relaxed),
            watches_removed: self.watches_removed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    pub records_read: u64,
    pub records_skipped: u64,
    pub events_forwarded: u64,
    pub events_synthesized: u64,
    pub watches_added: u64,
    pub watches_removed: u64,
}

impl WatcherStatsSnapshot {
    /// Watches added and not yet removed.
    #[must_use]
    pub const fn active_watches(&self) -> u64 {
        self.watches_added.saturating_sub(self.watches_removed)
    }
}
