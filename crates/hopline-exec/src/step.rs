//! Step runtime unit: one step-copy driven on its own thread.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hopline_core::graph::DataErrorPolicy;
use hopline_core::id::UnitId;
use hopline_steps::{BatchOutcome, StepError, StepIo, StepLogic, UnitCounters};

use crate::scheduler::RunControl;

/// Lifecycle of a unit. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum StepState {
    Created = 0,
    Initialized = 1,
    Running = 2,
    Finished = 3,
    Stopped = 4,
    Errored = 5,
    Disposed = 6,
}

impl StepState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => StepState::Created,
            1 => StepState::Initialized,
            2 => StepState::Running,
            3 => StepState::Finished,
            4 => StepState::Stopped,
            5 => StepState::Errored,
            _ => StepState::Disposed,
        }
    }

    /// FINISHED, STOPPED or ERRORED.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Finished | StepState::Stopped | StepState::Errored
        )
    }

    fn can_move_to(self, to: StepState) -> bool {
        use StepState::*;
        matches!(
            (self, to),
            (Created, Initialized)
                | (Initialized, Running)
                | (Initialized, Disposed)
                | (Running, Finished | Stopped | Errored)
                | (Finished | Stopped | Errored, Disposed)
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Created => "CREATED",
            StepState::Initialized => "INITIALIZED",
            StepState::Running => "RUNNING",
            StepState::Finished => "FINISHED",
            StepState::Stopped => "STOPPED",
            StepState::Errored => "ERRORED",
            StepState::Disposed => "DISPOSED",
        };
        f.write_str(s)
    }
}

/// Unit state visible to the orchestrating thread.
pub(crate) struct UnitShared {
    pub(crate) id: UnitId,
    state: AtomicU8,
    /// State the unit ended in before being disposed.
    outcome: AtomicU8,
    pub(crate) counters: Arc<UnitCounters>,
}

impl UnitShared {
    pub(crate) fn new(id: UnitId, counters: Arc<UnitCounters>) -> Self {
        Self {
            id,
            state: AtomicU8::new(StepState::Created as u8),
            outcome: AtomicU8::new(StepState::Created as u8),
            counters,
        }
    }

    pub(crate) fn state(&self) -> StepState {
        StepState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Terminal state reached (FINISHED/STOPPED/ERRORED), or the current
    /// state if the unit never ran.
    pub(crate) fn outcome(&self) -> StepState {
        let o = StepState::from_u8(self.outcome.load(Ordering::Acquire));
        if o.is_terminal() {
            o
        } else {
            self.state()
        }
    }

    /// Move to `to` if that is a forward transition from the current state.
    pub(crate) fn advance(&self, to: StepState) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            if !StepState::from_u8(cur).can_move_to(to) {
                return false;
            }
            match self
                .state
                .compare_exchange(cur, to as u8, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    if to.is_terminal() {
                        self.outcome.store(to as u8, Ordering::Release);
                    }
                    #[cfg(feature = "tracing")]
                    tracing::debug!(unit = %self.id, from = %StepState::from_u8(cur), to = %to, "unit state");
                    return true;
                }
                Err(observed) => cur = observed,
            }
        }
    }
}

/// Everything one unit thread owns.
///
/// A unit dropped before it could run (its thread failed to start) still
/// disposes its logic.
pub(crate) struct StepUnit {
    logic: Box<dyn StepLogic>,
    io: StepIo,
    shared: Arc<UnitShared>,
    control: Arc<RunControl>,
    disposed: bool,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl StepUnit {
    pub(crate) fn new(
        logic: Box<dyn StepLogic>,
        io: StepIo,
        shared: Arc<UnitShared>,
        control: Arc<RunControl>,
    ) -> Self {
        Self {
            logic,
            io,
            shared,
            control,
            disposed: false,
        }
    }

    /// Drive `process_batch` until the step finishes, fails, or the run stops.
    ///
    /// Data errors are counted here; under `Skip` the loop keeps going.
    fn run_loop(&mut self) -> Result<(), StepError> {
        loop {
            if self.io.is_stopped() {
                return Err(StepError::Aborted);
            }
            crate::fail_point!(format!("process_batch.{}", self.shared.id.step));
            match self.logic.process_batch(&mut self.io) {
                Ok(BatchOutcome::Continue) => {}
                Ok(BatchOutcome::Finished) => return Ok(()),
                Err(StepError::Data(msg)) => {
                    self.shared.counters.record_error(msg.clone());
                    if self.io.policy() == DataErrorPolicy::Abort {
                        return Err(StepError::Data(msg));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Body of the unit thread. Always ends in DISPOSED with every output
    /// channel marked done.
    pub(crate) fn run(mut self) {
        if !self.shared.advance(StepState::Running) {
            // Never initialized.
            self.io.finish_outputs();
            self.dispose(StepState::Stopped);
            return;
        }

        let end = match catch_unwind(AssertUnwindSafe(|| self.run_loop())) {
            Ok(Ok(())) => StepState::Finished,
            Ok(Err(StepError::Aborted)) => StepState::Stopped,
            Ok(Err(StepError::Data(msg))) => {
                self.fail(&format!("data error: {msg}"), false);
                StepState::Errored
            }
            Ok(Err(e)) => {
                self.fail(&e.to_string(), true);
                StepState::Errored
            }
            Err(payload) => {
                self.fail(&format!("panicked: {}", panic_message(payload.as_ref())), true);
                StepState::Errored
            }
        };

        self.io.finish_outputs();
        self.dispose(end);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            unit = %self.shared.id,
            state = %end,
            read = self.shared.counters.lines_read(),
            written = self.shared.counters.lines_written(),
            "unit done"
        );
    }

    fn fail(&self, message: &str, record: bool) {
        #[cfg(feature = "tracing")]
        tracing::error!(unit = %self.shared.id, error = %message, "unit failed; stopping run");
        if record {
            self.shared.counters.record_error(message);
        }
        self.control.stop_all();
    }

    fn dispose(&mut self, end: StepState) {
        self.disposed = true;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.logic.dispose())) {
            self.shared.counters.record_error(format!(
                "dispose panicked: {}",
                panic_message(payload.as_ref())
            ));
        }
        self.shared.advance(end);
        self.shared.advance(StepState::Disposed);
    }
}

impl Drop for StepUnit {
    fn drop(&mut self) {
        if !self.disposed {
            self.io.finish_outputs();
            self.dispose(StepState::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopline_channel::{RowChannel, Wakeup};
    use hopline_core::id::ChannelId;
    use hopline_steps::StepContext;
    use std::sync::atomic::AtomicUsize;

    struct CountDispose(Arc<AtomicUsize>);

    impl StepLogic for CountDispose {
        fn init(&mut self, _ctx: &StepContext<'_>) -> Result<(), StepError> {
            Ok(())
        }
        fn process_batch(&mut self, _io: &mut StepIo) -> Result<BatchOutcome, StepError> {
            Ok(BatchOutcome::Finished)
        }
        fn dispose(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn unit(disposed: &Arc<AtomicUsize>) -> (StepUnit, Arc<UnitShared>, Arc<RowChannel>) {
        let control = Arc::new(RunControl::new());
        let mut io = StepIo::new(UnitId::new("s", 0), Arc::new(Wakeup::new()), control.stop_flag());
        let out = Arc::new(RowChannel::new(ChannelId::new(0), 4));
        io.add_output("next", vec![Arc::clone(&out)]);
        let shared = Arc::new(UnitShared::new(UnitId::new("s", 0), Arc::clone(io.counters())));
        shared.advance(StepState::Initialized);
        let logic = Box::new(CountDispose(Arc::clone(disposed)));
        let unit = StepUnit::new(logic, io, Arc::clone(&shared), control);
        (unit, shared, out)
    }

    #[test]
    fn unit_that_never_ran_is_disposed_on_drop() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let (unit, shared, out) = unit(&disposed);
        drop(unit);

        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(shared.state(), StepState::Disposed);
        assert!(out.is_producer_done());
    }

    #[test]
    fn unit_that_ran_is_disposed_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let (unit, shared, _out) = unit(&disposed);
        unit.run();

        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(shared.outcome(), StepState::Finished);
        assert_eq!(shared.state(), StepState::Disposed);
    }

    #[test]
    fn transitions_only_move_forward() {
        let u = UnitShared::new(UnitId::new("s", 0), Arc::new(UnitCounters::new()));
        assert!(!u.advance(StepState::Running));
        assert!(u.advance(StepState::Initialized));
        assert!(u.advance(StepState::Running));
        assert!(u.advance(StepState::Errored));
        assert!(!u.advance(StepState::Finished));
        assert!(!u.advance(StepState::Running));
        assert!(u.advance(StepState::Disposed));
        assert_eq!(u.state(), StepState::Disposed);
        assert_eq!(u.outcome(), StepState::Errored);
    }

    #[test]
    fn state_names() {
        assert_eq!(StepState::Initialized.to_string(), "INITIALIZED");
        assert_eq!(
            serde_json::to_string(&StepState::Errored).unwrap(),
            "\"ERRORED\""
        );
        assert!(StepState::Stopped.is_terminal());
        assert!(!StepState::Disposed.is_terminal());
    }
}
