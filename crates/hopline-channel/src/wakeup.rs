//! Consumer-side wakeup shared by all channels feeding one step-copy.
//!
//! A step reading several inputs at once cannot block on any single channel
//! without risking a stall, so every feeding channel bumps this generation
//! counter on put/done/abort. The consumer records the generation, scans its
//! inputs without blocking, and only sleeps if nothing changed since.

use std::sync::{Condvar, Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct Wakeup {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Wakeup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation; pass it to `wait_past` after a fruitless scan.
    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify(&self) {
        let mut g = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *g = g.wrapping_add(1);
        self.changed.notify_all();
    }

    /// Block until the generation differs from `seen`.
    pub fn wait_past(&self, seen: u64) {
        let g = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _g = self
            .changed
            .wait_while(g, |g| *g == seen)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
