//! Fails the unit (and so the run) once too many rows arrive.

use serde::Deserialize;

use crate::io::StepIo;
use crate::traits::{BatchOutcome, StepContext, StepError, StepLogic};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AbortConfig {
    /// Rows tolerated before failing.
    #[serde(default)]
    threshold: u64,
    message: Option<String>,
}

#[derive(Default)]
pub struct Abort {
    threshold: u64,
    message: Option<String>,
    seen: u64,
}

impl StepLogic for Abort {
    fn init(&mut self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let cfg: AbortConfig = ctx.parse_config()?;
        self.threshold = cfg.threshold;
        self.message = cfg.message;
        self.seen = 0;
        Ok(())
    }

    fn process_batch(&mut self, io: &mut StepIo) -> Result<BatchOutcome, StepError> {
        for _ in 0..io.batch_rows() {
            let Some(row) = io.get_row()? else {
                return Ok(BatchOutcome::Finished);
            };
            self.seen += 1;
            if self.seen > self.threshold {
                let msg = self
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("row threshold {} exceeded", self.threshold));
                return Err(StepError::Fatal(msg));
            }
            io.put_row(row)?;
        }
        Ok(BatchOutcome::Continue)
    }
}
