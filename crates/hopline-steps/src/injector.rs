//! Entry step for externally produced rows.
//!
//! It has no upstream hop of its own: a row producer handle writes into a
//! channel that the scheduler attaches as this step's input.

use crate::dummy::pass_through;
use crate::io::StepIo;
use crate::traits::{BatchOutcome, StepContext, StepError, StepLogic};

#[derive(Default)]
pub struct Injector {
    name: String,
}

impl StepLogic for Injector {
    fn init(&mut self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        self.name = ctx.step_name().to_string();
        Ok(())
    }

    fn process_batch(&mut self, io: &mut StepIo) -> Result<BatchOutcome, StepError> {
        let outcome = pass_through(io)?;
        #[cfg(feature = "tracing")]
        if outcome == BatchOutcome::Finished {
            tracing::debug!(
                step = %self.name,
                rows = io.counters().lines_written(),
                "injected rows forwarded"
            );
        }
        Ok(outcome)
    }
}
