//! Per-channel counters.
//!
//! Keep this cheap: relaxed atomics, no locks. Readers get a snapshot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct ChannelStats {
    rows_put: AtomicU64,
    rows_taken: AtomicU64,
    peak_depth: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub rows_put: u64,
    pub rows_taken: u64,
    pub peak_depth: usize,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self, depth: usize) {
        self.rows_put.fetch_add(1, Ordering::Relaxed);
        let mut cur = self.peak_depth.load(Ordering::Relaxed);
        while depth > cur {
            match self.peak_depth.compare_exchange(
                cur,
                depth,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    pub(crate) fn record_take(&self) {
        self.rows_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rows_put: self.rows_put.load(Ordering::Relaxed),
            rows_taken: self.rows_taken.load(Ordering::Relaxed),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
        }
    }
}
