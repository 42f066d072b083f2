//! Per-unit counters, written by the unit's own thread and read by the
//! orchestrating thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct UnitCounters {
    lines_read: AtomicU64,
    lines_written: AtomicU64,
    errors: AtomicU64,
    messages: Mutex<Vec<String>>,
}

impl UnitCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self) {
        self.lines_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one error and keep its message.
    pub fn record_error(&self, message: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::AcqRel);
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.into());
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
