//! Pass-through step. With several inputs, rows are interleaved in arrival order.

use crate::io::StepIo;
use crate::traits::{BatchOutcome, StepContext, StepError, StepLogic};

#[derive(Default)]
pub struct Dummy;

/// Forward up to one batch of rows from any input to every output.
pub(crate) fn pass_through(io: &mut StepIo) -> Result<BatchOutcome, StepError> {
    for _ in 0..io.batch_rows() {
        match io.get_row()? {
            Some(row) => io.put_row(row)?,
            None => return Ok(BatchOutcome::Finished),
        }
    }
    Ok(BatchOutcome::Continue)
}

impl StepLogic for Dummy {
    fn init(&mut self, _ctx: &StepContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    fn process_batch(&mut self, io: &mut StepIo) -> Result<BatchOutcome, StepError> {
        pass_through(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ints, run_to_end, Harness};

    #[test]
    fn forwards_everything_in_batches() {
        let h = Harness::new(1, 1).with_batch_rows(2);
        h.feed(0, &[1, 2, 3, 4, 5]);
        let (mut io, out) = h.into_parts();

        let mut step = Dummy;
        let calls = run_to_end(&mut step, &mut io);
        assert!(calls >= 3);
        assert_eq!(ints(&out[0]), vec![1, 2, 3, 4, 5]);
    }
}
