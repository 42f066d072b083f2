//! Sequential concatenation of input streams.
//!
//! Input `k` is read to its end-of-stream before input `k+1` is touched, so
//! the output is the exact concatenation of each stream in arrival order. The
//! switch to the next input happens only on an explicit end-of-stream from the
//! active one; an empty-but-open earlier input blocks the step.

use serde::Deserialize;

use crate::io::StepIo;
use crate::traits::{BatchOutcome, StepContext, StepError, StepLogic};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AppendConfig {
    /// Upstream step names, first to last. Inputs not named here follow in
    /// hop order.
    #[serde(default)]
    order: Vec<String>,
}

#[derive(Default)]
pub struct Append {
    order: Vec<usize>,
    current: usize,
    resolved: bool,
}

impl Append {
    fn resolve_order(input_steps: &[String], named: &[String]) -> Result<Vec<usize>, StepError> {
        let mut order = Vec::with_capacity(input_steps.len());
        for name in named {
            let matching: Vec<usize> = input_steps
                .iter()
                .enumerate()
                .filter(|(_, s)| *s == name)
                .map(|(i, _)| i)
                .collect();
            if matching.is_empty() {
                return Err(StepError::Config(format!(
                    "append order names '{name}', which is not an input"
                )));
            }
            for i in matching {
                if !order.contains(&i) {
                    order.push(i);
                }
            }
        }
        for i in 0..input_steps.len() {
            if !order.contains(&i) {
                order.push(i);
            }
        }
        Ok(order)
    }
}

impl StepLogic for Append {
    fn init(&mut self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let cfg: AppendConfig = ctx.parse_config()?;
        self.order = Self::resolve_order(ctx.input_steps, &cfg.order)?;
        self.current = 0;
        self.resolved = false;
        Ok(())
    }

    fn process_batch(&mut self, io: &mut StepIo) -> Result<BatchOutcome, StepError> {
        if !self.resolved {
            // Channels attached after init (none in a validated graph) go last.
            for i in self.order.len()..io.input_count() {
                self.order.push(i);
            }
            self.order.retain(|&i| i < io.input_count());
            self.resolved = true;
        }

        let mut moved = 0;
        while moved < io.batch_rows() {
            let Some(&idx) = self.order.get(self.current) else {
                return Ok(BatchOutcome::Finished);
            };
            match io.get_row_from(idx)? {
                Some(row) => {
                    io.put_row(row)?;
                    moved += 1;
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(unit = %io.unit(), input = idx, "append switching input");
                    self.current += 1;
                }
            }
        }
        Ok(BatchOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{init_step, ints, run_to_end, Harness};
    use hopline_core::graph::StepMeta;
    use serde_json::json;

    fn step(config: serde_json::Value, inputs: &[&str]) -> Result<Append, StepError> {
        let meta = StepMeta::new("append", "append").with_config(config);
        let mut s = Append::default();
        init_step(&mut s, &meta, inputs, &["out0"])?;
        Ok(s)
    }

    #[test]
    fn concatenates_in_hop_order() {
        let h = Harness::new(2, 1).with_batch_rows(2);
        h.feed(0, &[1, 2, 3]);
        h.feed(1, &[10, 20, 30]);
        let (mut io, out) = h.into_parts();

        let mut s = step(serde_json::Value::Null, &["in0", "in1"]).unwrap();
        run_to_end(&mut s, &mut io);
        assert_eq!(ints(&out[0]), vec![1, 2, 3, 10, 20, 30]);
    }

    #[test]
    fn explicit_order_wins_over_hop_order() {
        let h = Harness::new(2, 1);
        h.feed(0, &[1, 2]);
        h.feed(1, &[10, 20]);
        let (mut io, out) = h.into_parts();

        let mut s = step(json!({"order": ["in1"]}), &["in0", "in1"]).unwrap();
        run_to_end(&mut s, &mut io);
        assert_eq!(ints(&out[0]), vec![10, 20, 1, 2]);
    }

    #[test]
    fn empty_input_contributes_nothing() {
        let h = Harness::new(2, 1);
        h.feed(0, &[]);
        h.feed(1, &[7, 8, 9]);
        let (mut io, out) = h.into_parts();

        let mut s = step(serde_json::Value::Null, &["in0", "in1"]).unwrap();
        run_to_end(&mut s, &mut io);
        assert_eq!(ints(&out[0]), vec![7, 8, 9]);
    }

    #[test]
    fn second_input_finishing_first_does_not_reorder() {
        let h = Harness::new(2, 1);
        h.feed(1, &[10, 20, 30]);
        let first = h.input(0);
        let (mut io, out) = h.into_parts();

        let late = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            for n in [1, 2, 3] {
                first.put(crate::testing::int_row(n)).unwrap();
            }
            first.mark_producer_done();
        });

        let mut s = step(serde_json::Value::Null, &["in0", "in1"]).unwrap();
        run_to_end(&mut s, &mut io);
        late.join().unwrap();
        assert_eq!(ints(&out[0]), vec![1, 2, 3, 10, 20, 30]);
    }

    #[test]
    fn unknown_order_name_is_config_error() {
        let err = step(json!({"order": ["nope"]}), &["in0", "in1"]).err();
        assert!(matches!(err, Some(StepError::Config(_))));
    }
}
