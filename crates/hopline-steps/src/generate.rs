//! Source step emitting a constant row.

use std::sync::Arc;

use serde::Deserialize;

use hopline_core::schema::{DataType, RowSchema, ValueMeta};
use hopline_core::types::{Row, Value};

use crate::io::StepIo;
use crate::traits::{BatchOutcome, StepContext, StepError, StepLogic};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDef {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenerateConfig {
    /// Number of rows; absent means run until stopped.
    limit: Option<u64>,
    #[serde(default)]
    fields: Vec<FieldDef>,
}

#[derive(Default)]
pub struct GenerateRows {
    row: Option<Row>,
    limit: Option<u64>,
    emitted: u64,
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

impl StepLogic for GenerateRows {
    fn init(&mut self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let cfg: GenerateConfig = ctx.parse_config()?;
        let mut metas = Vec::with_capacity(cfg.fields.len());
        let mut values = Vec::with_capacity(cfg.fields.len());
        for f in &cfg.fields {
            let data_type = DataType::parse(&f.data_type).ok_or_else(|| {
                StepError::Config(format!("field '{}': unknown type '{}'", f.name, f.data_type))
            })?;
            let value = json_to_value(&f.value)
                .convert_to(data_type)
                .map_err(|e| StepError::Config(format!("field '{}': {e}", f.name)))?;
            metas.push(ValueMeta::new(f.name.clone(), data_type));
            values.push(value);
        }
        let schema = Arc::new(RowSchema::new(metas));
        self.row = Some(Row::new(schema, values)?);
        self.limit = cfg.limit;
        self.emitted = 0;
        Ok(())
    }

    fn process_batch(&mut self, io: &mut StepIo) -> Result<BatchOutcome, StepError> {
        let row = self
            .row
            .as_ref()
            .ok_or_else(|| StepError::Fatal("generate_rows used before init".into()))?;
        for _ in 0..io.batch_rows() {
            if self.limit.is_some_and(|l| self.emitted >= l) {
                return Ok(BatchOutcome::Finished);
            }
            io.put_row(row.clone())?;
            self.emitted += 1;
        }
        if io.is_stopped() {
            return Err(StepError::Aborted);
        }
        Ok(BatchOutcome::Continue)
    }
}
