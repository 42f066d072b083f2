//! Row I/O of one step-copy.
//!
//! `StepIo` owns the unit's input channel read ends and output channel write
//! ends. Steps never touch channels directly: every row read or written passes
//! through here so counters, listeners, and safe-mode checks see it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hopline_channel::{Poll, RowChannel, Wakeup};
use hopline_core::graph::DataErrorPolicy;
use hopline_core::id::UnitId;
use hopline_core::schema::RowSchema;
use hopline_core::types::Row;

use crate::counters::UnitCounters;
use crate::traits::StepError;

/// Read-only tap on rows crossing a unit's boundary.
///
/// Called synchronously on the unit's thread, in the order rows cross.
/// Implementations must not block for long: they stall the pipeline.
pub trait RowListener: Send + Sync {
    fn row_read(&self, _row: &Row) {}
    fn row_written(&self, _row: &Row) {}
}

struct InputChannel {
    source: UnitId,
    channel: Arc<RowChannel>,
    finished: bool,
}

/// All channels of one output hop. A hop into an N-copy step has N channels;
/// rows go to them round-robin.
struct OutputHop {
    target: String,
    channels: Vec<Arc<RowChannel>>,
    next: usize,
}

impl OutputHop {
    fn send(&mut self, row: Row) -> Result<(), StepError> {
        if self.channels.is_empty() {
            return Ok(());
        }
        let idx = self.next % self.channels.len();
        self.next = (idx + 1) % self.channels.len();
        self.channels[idx].put(row)?;
        Ok(())
    }
}

pub struct StepIo {
    unit: UnitId,
    inputs: Vec<InputChannel>,
    outputs: Vec<OutputHop>,
    wakeup: Arc<Wakeup>,
    listeners: Vec<Arc<dyn RowListener>>,
    counters: Arc<UnitCounters>,
    stop: Arc<AtomicBool>,
    policy: DataErrorPolicy,
    distribute: bool,
    next_input: usize,
    next_output: usize,
    batch_rows: usize,
    safe_mode: bool,
    layout: Option<Arc<RowSchema>>,
}

impl StepIo {
    pub fn new(unit: UnitId, wakeup: Arc<Wakeup>, stop: Arc<AtomicBool>) -> Self {
        Self {
            unit,
            inputs: vec![],
            outputs: vec![],
            wakeup,
            listeners: vec![],
            counters: Arc::new(UnitCounters::new()),
            stop,
            policy: DataErrorPolicy::default(),
            distribute: false,
            next_input: 0,
            next_output: 0,
            batch_rows: 64,
            safe_mode: false,
            layout: None,
        }
    }

    pub fn with_policy(mut self, policy: DataErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_distribute(mut self, distribute: bool) -> Self {
        self.distribute = distribute;
        self
    }

    pub fn with_batch_rows(mut self, rows: usize) -> Self {
        self.batch_rows = rows.max(1);
        self
    }

    pub fn with_safe_mode(mut self, safe_mode: bool) -> Self {
        self.safe_mode = safe_mode;
        self
    }

    /// Attach an input channel. Its consumer wakeup must be this unit's.
    pub fn add_input(&mut self, source: UnitId, channel: Arc<RowChannel>) {
        self.inputs.push(InputChannel {
            source,
            channel,
            finished: false,
        });
    }

    /// Attach one output hop with the channels to each copy of its target.
    pub fn add_output(&mut self, target: impl Into<String>, channels: Vec<Arc<RowChannel>>) {
        self.outputs.push(OutputHop {
            target: target.into(),
            channels,
            next: 0,
        });
    }

    pub fn add_listener(&mut self, listener: Arc<dyn RowListener>) {
        self.listeners.push(listener);
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn wakeup(&self) -> &Arc<Wakeup> {
        &self.wakeup
    }

    pub fn counters(&self) -> &Arc<UnitCounters> {
        &self.counters
    }

    pub fn batch_rows(&self) -> usize {
        self.batch_rows
    }

    pub fn policy(&self) -> DataErrorPolicy {
        self.policy
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_source(&self, idx: usize) -> Option<&UnitId> {
        self.inputs.get(idx).map(|i| &i.source)
    }

    pub fn is_input_finished(&self, idx: usize) -> bool {
        self.inputs.get(idx).map_or(true, |i| i.finished)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn output_target(&self, idx: usize) -> Option<&str> {
        self.outputs.get(idx).map(|o| o.target.as_str())
    }

    /// Set by the scheduler when the run is stopping.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn on_read(&self, row: &Row) {
        self.counters.record_read();
        for l in &self.listeners {
            l.row_read(row);
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(unit = %self.unit, "row read");
    }

    fn on_written(&self, row: &Row) {
        self.counters.record_written();
        for l in &self.listeners {
            l.row_written(row);
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(unit = %self.unit, "row written");
    }

    /// Next row from any input, interleaving inputs round-robin.
    ///
    /// Returns `Ok(None)` once every input reached end-of-stream (or there are
    /// no inputs at all). Waits on the unit's wakeup, not on a timer, when all
    /// live inputs are empty.
    pub fn get_row(&mut self) -> Result<Option<Row>, StepError> {
        loop {
            let live: Vec<usize> = (0..self.inputs.len())
                .filter(|&i| !self.inputs[i].finished)
                .collect();
            match live.as_slice() {
                [] => return Ok(None),
                [only] => return self.get_row_from(*only),
                _ => {}
            }

            let seen = self.wakeup.generation();
            let n = self.inputs.len();
            for k in 0..n {
                let idx = (self.next_input + k) % n;
                if self.inputs[idx].finished {
                    continue;
                }
                match self.inputs[idx].channel.try_get()? {
                    Poll::Item(row) => {
                        self.next_input = (idx + 1) % n;
                        self.on_read(&row);
                        return Ok(Some(row));
                    }
                    Poll::EndOfStream => self.inputs[idx].finished = true,
                    Poll::Empty => {}
                }
            }

            if self.inputs.iter().any(|i| !i.finished) {
                if self.is_stopped() {
                    return Err(StepError::Aborted);
                }
                self.wakeup.wait_past(seen);
            }
        }
    }

    /// Blocking read from one specific input. `Ok(None)` is that input's
    /// end-of-stream; it is remembered so later calls return `None` at once.
    pub fn get_row_from(&mut self, idx: usize) -> Result<Option<Row>, StepError> {
        let input = self
            .inputs
            .get_mut(idx)
            .ok_or_else(|| StepError::Fatal(format!("no input #{idx}")))?;
        if input.finished {
            return Ok(None);
        }
        match input.channel.get()? {
            Some(row) => {
                self.on_read(&row);
                Ok(Some(row))
            }
            None => {
                input.finished = true;
                #[cfg(feature = "tracing")]
                tracing::debug!(unit = %self.unit, source = %input.source, "input finished");
                Ok(None)
            }
        }
    }

    fn check_layout(&mut self, row: &Row) -> Result<(), StepError> {
        if !self.safe_mode {
            return Ok(());
        }
        match &self.layout {
            None => {
                self.layout = Some(Arc::clone(row.schema()));
                Ok(())
            }
            Some(first) if Arc::ptr_eq(first, row.schema()) || first.same_layout(row.schema()) => {
                Ok(())
            }
            Some(first) => Err(StepError::Fatal(format!(
                "unit {}: row layout [{}] differs from first row [{}]",
                self.unit,
                row.schema().field_names().collect::<Vec<_>>().join(", "),
                first.field_names().collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Write a row downstream: a copy to every output hop, or to one hop
    /// (round-robin) when the step distributes. Listeners see the row even
    /// when the step has no outputs.
    pub fn put_row(&mut self, row: Row) -> Result<(), StepError> {
        self.check_layout(&row)?;
        let n = self.outputs.len();
        if n == 0 {
            self.on_written(&row);
            return Ok(());
        }
        if self.distribute && n > 1 {
            let idx = self.next_output % n;
            self.next_output = (idx + 1) % n;
            self.outputs[idx].send(row.clone())?;
        } else {
            for hop in &mut self.outputs[..n - 1] {
                hop.send(row.clone())?;
            }
            self.outputs[n - 1].send(row.clone())?;
        }
        self.on_written(&row);
        Ok(())
    }

    /// Write a row to a single output hop.
    pub fn put_row_to(&mut self, idx: usize, row: Row) -> Result<(), StepError> {
        self.check_layout(&row)?;
        let hop = self
            .outputs
            .get_mut(idx)
            .ok_or_else(|| StepError::Fatal(format!("no output #{idx}")))?;
        hop.send(row.clone())?;
        self.on_written(&row);
        Ok(())
    }

    /// Report a per-row failure.
    ///
    /// Under `Skip` the error is counted and `Ok(())` tells the step to drop the
    /// row and continue. Under `Abort` it is returned as `StepError::Data` for
    /// the run loop to count and fail the unit.
    pub fn data_error(&mut self, err: impl std::fmt::Display) -> Result<(), StepError> {
        let message = err.to_string();
        match self.policy {
            DataErrorPolicy::Skip => {
                #[cfg(feature = "tracing")]
                tracing::debug!(unit = %self.unit, error = %message, "row skipped");
                self.counters.record_error(message);
                Ok(())
            }
            DataErrorPolicy::Abort => Err(StepError::Data(message)),
        }
    }

    /// Signal end-of-stream on every output channel. Idempotent.
    pub fn finish_outputs(&self) {
        for hop in &self.outputs {
            for ch in &hop.channels {
                ch.mark_producer_done();
            }
        }
    }
}
