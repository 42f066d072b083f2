//! Row injection handle.
//!
//! A `RowProducer` is the write end of an extra input channel attached to a
//! step that has no upstream hop. To the step it looks like any other input:
//! `finish()` is its end-of-stream.

use std::sync::Arc;

use hopline_channel::RowChannel;
use hopline_core::id::UnitId;
use hopline_core::schema::RowSchema;
use hopline_core::types::{Row, Value};

use crate::runtime::ExecError;

pub struct RowProducer {
    unit: UnitId,
    channel: Arc<RowChannel>,
}

impl RowProducer {
    pub(crate) fn new(unit: UnitId, channel: Arc<RowChannel>) -> Self {
        Self { unit, channel }
    }

    /// The step-copy this handle feeds.
    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    /// Build a row from `schema` and `values` and send it. Blocks while the
    /// channel is full; fails once the run is stopped.
    pub fn put(&self, schema: &Arc<RowSchema>, values: Vec<Value>) -> Result<(), ExecError> {
        let row = Row::new(Arc::clone(schema), values)?;
        self.put_row(row)
    }

    pub fn put_row(&self, row: Row) -> Result<(), ExecError> {
        self.channel.put(row)?;
        Ok(())
    }

    /// Signal end-of-stream. Idempotent; also done on drop.
    pub fn finish(&self) {
        #[cfg(feature = "tracing")]
        if !self.channel.is_producer_done() {
            tracing::debug!(unit = %self.unit, rows = self.channel.stats().snapshot().rows_put, "producer finished");
        }
        self.channel.mark_producer_done();
    }
}

impl Drop for RowProducer {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for RowProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowProducer")
            .field("unit", &self.unit)
            .field("channel", &self.channel.id())
            .finish()
    }
}
