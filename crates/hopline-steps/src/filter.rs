//! Row filter with simple predicate evaluation.
//!
//! Supports conditions of the form `"field OP literal"` where OP is one of
//! `==, !=, <, <=, >, >=`. The literal is converted to the field's value type
//! before comparing; a literal that does not convert is a data error for that
//! row. Null fields never match.
//!
//! Without targets, matching rows go to every output and the rest are dropped.
//! With `send_true_to` / `send_false_to`, each side goes to its named hop only
//! (a side without a target is dropped).

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Deserialize;

use hopline_core::schema::RowSchema;
use hopline_core::types::{Row, Value};

use crate::io::StepIo;
use crate::traits::{BatchOutcome, StepContext, StepError, StepLogic};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterConfig {
    condition: String,
    send_true_to: Option<String>,
    send_false_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Predicate {
    field: String,
    op: CmpOp,
    literal: String,
}

/// Parse a simple predicate like `"age > 18"` or `"name == Alice"`.
fn parse_simple_predicate(expr: &str) -> Result<Predicate, StepError> {
    // Two-character operators first so "<=" is not read as "<".
    let ops = [
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        ("<=", CmpOp::Le),
        (">=", CmpOp::Ge),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ];

    for (text, op) in ops {
        if let Some(pos) = expr.find(text) {
            let field = expr[..pos].trim().to_string();
            let literal = expr[pos + text.len()..].trim().to_string();
            if field.is_empty() {
                break;
            }
            return Ok(Predicate { field, op, literal });
        }
    }

    Err(StepError::Config(format!("unparseable condition: {expr}")))
}

#[derive(Default)]
pub struct FilterRows {
    predicate: Option<Predicate>,
    true_to: Option<usize>,
    false_to: Option<usize>,
    routed: bool,
    /// Field index resolved against the last schema seen.
    cached: Option<(Arc<RowSchema>, usize)>,
}

impl FilterRows {
    fn field_index(&mut self, row: &Row, field: &str) -> Result<usize, StepError> {
        if let Some((schema, idx)) = &self.cached {
            if Arc::ptr_eq(schema, row.schema()) {
                return Ok(*idx);
            }
        }
        let idx = row
            .schema()
            .index_of(field)
            .ok_or_else(|| StepError::Fatal(format!("field '{field}' not found in input row")))?;
        self.cached = Some((Arc::clone(row.schema()), idx));
        Ok(idx)
    }

    /// `Ok(None)` means the row hit a data error that the policy skipped.
    fn evaluate(&mut self, row: &Row, io: &mut StepIo) -> Result<Option<bool>, StepError> {
        let pred = self
            .predicate
            .clone()
            .ok_or_else(|| StepError::Fatal("filter_rows used before init".into()))?;
        let idx = self.field_index(row, &pred.field)?;
        let value = row.value(idx).unwrap_or(&Value::Null);
        let Some(target) = value.data_type() else {
            return Ok(Some(false));
        };
        match Value::String(pred.literal.clone()).convert_to(target) {
            Ok(lit) => Ok(Some(pred.op.holds(value.compare(&lit)))),
            Err(e) => {
                io.data_error(e)?;
                Ok(None)
            }
        }
    }
}

impl StepLogic for FilterRows {
    fn init(&mut self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let cfg: FilterConfig = ctx.parse_config()?;
        self.predicate = Some(parse_simple_predicate(&cfg.condition)?);
        self.true_to = cfg
            .send_true_to
            .as_deref()
            .map(|s| ctx.output_index(s))
            .transpose()?;
        self.false_to = cfg
            .send_false_to
            .as_deref()
            .map(|s| ctx.output_index(s))
            .transpose()?;
        self.routed = self.true_to.is_some() || self.false_to.is_some();
        self.cached = None;
        Ok(())
    }

    fn process_batch(&mut self, io: &mut StepIo) -> Result<BatchOutcome, StepError> {
        for _ in 0..io.batch_rows() {
            let Some(row) = io.get_row()? else {
                return Ok(BatchOutcome::Finished);
            };
            let Some(keep) = self.evaluate(&row, io)? else {
                continue;
            };
            if !self.routed {
                if keep {
                    io.put_row(row)?;
                }
                continue;
            }
            let target = if keep { self.true_to } else { self.false_to };
            if let Some(idx) = target {
                io.put_row_to(idx, row)?;
            }
        }
        Ok(BatchOutcome::Continue)
    }
}
