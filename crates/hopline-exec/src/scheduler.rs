//! Thread management for a run: spawning unit threads and stopping them.
//!
//! Stopping is cooperative. `RunControl::stop_all` raises the run's stop flag
//! and aborts every channel, which releases any unit blocked in `put`/`get`
//! at once; units that are busy see the flag at their next loop check.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use hopline_channel::{RowChannel, Wakeup};
use hopline_core::id::UnitId;

use crate::step::StepUnit;

/// Stop flag plus every channel and consumer wakeup of one run.
#[derive(Default)]
pub(crate) struct RunControl {
    stop: Arc<AtomicBool>,
    channels: Mutex<Vec<Arc<RowChannel>>>,
    wakeups: Mutex<Vec<Arc<Wakeup>>>,
}

impl RunControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The flag handed to each unit's `StepIo`.
    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub(crate) fn register_channel(&self, channel: Arc<RowChannel>) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(channel);
    }

    pub(crate) fn register_wakeup(&self, wakeup: Arc<Wakeup>) {
        self.wakeups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(wakeup);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Idempotent.
    pub(crate) fn stop_all(&self) {
        if !self.stop.swap(true, Ordering::AcqRel) {
            #[cfg(feature = "tracing")]
            tracing::info!("stopping all units");
        }
        for ch in self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            ch.abort();
        }
        for w in self
            .wakeups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            w.notify();
        }
    }
}

/// Cloneable handle that stops a run from any thread, e.g. a watchdog
/// enforcing a deadline while another thread waits for the run.
#[derive(Clone)]
pub struct StopHandle {
    control: Arc<RunControl>,
}

impl StopHandle {
    pub(crate) fn new(control: Arc<RunControl>) -> Self {
        Self { control }
    }

    pub fn stop(&self) {
        self.control.stop_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Start `unit` on a thread named `{prefix}{step}.{copy}`.
pub(crate) fn spawn_unit(
    prefix: &str,
    id: &UnitId,
    unit: StepUnit,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("{prefix}{id}"))
        .spawn(move || unit.run())
}

/// Join every thread; returns the units whose thread could not be joined.
pub(crate) fn join_all(handles: Vec<(UnitId, JoinHandle<()>)>) -> Vec<UnitId> {
    let mut lost = vec![];
    for (id, h) in handles {
        if h.join().is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!(unit = %id, "unit thread panicked outside its run loop");
            lost.push(id);
        }
    }
    lost
}
