//! Select, rename, and retype fields.
//!
//! The output layout is derived from the first input layout and reused for as
//! long as rows arrive with the same schema.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use hopline_core::schema::{DataType, RowSchema};
use hopline_core::types::Row;

use crate::io::StepIo;
use crate::traits::{BatchOutcome, StepContext, StepError, StepLogic};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectConfig {
    /// Fields to keep, in output order. Empty keeps every field.
    #[serde(default)]
    select: Vec<String>,
    #[serde(default)]
    rename: BTreeMap<String, String>,
    /// Field (by input name) to target type name.
    #[serde(default)]
    convert: BTreeMap<String, String>,
}

struct Layout {
    input: Arc<RowSchema>,
    output: Arc<RowSchema>,
    /// Input position and optional conversion of each output field.
    fields: Vec<(usize, Option<DataType>)>,
}

#[derive(Default)]
pub struct SelectValues {
    select: Vec<String>,
    rename: BTreeMap<String, String>,
    convert: BTreeMap<String, DataType>,
    layout: Option<Layout>,
}

impl SelectValues {
    fn build_layout(&self, input: &Arc<RowSchema>) -> Result<Layout, StepError> {
        let positions: Vec<usize> = if self.select.is_empty() {
            (0..input.len()).collect()
        } else {
            self.select
                .iter()
                .map(|name| {
                    input
                        .index_of(name)
                        .ok_or_else(|| StepError::Fatal(format!("select: no field '{name}'")))
                })
                .collect::<Result<_, _>>()?
        };
        for name in self.rename.keys().chain(self.convert.keys()) {
            if input.index_of(name).is_none() {
                return Err(StepError::Fatal(format!("select: no field '{name}'")));
            }
        }

        let mut metas = Vec::with_capacity(positions.len());
        let mut fields = Vec::with_capacity(positions.len());
        for pos in positions {
            let mut meta = input
                .field(pos)
                .cloned()
                .ok_or_else(|| StepError::Fatal(format!("select: no field #{pos}")))?;
            let conversion = self.convert.get(&meta.name).copied();
            if let Some(t) = conversion {
                meta.data_type = t;
            }
            if let Some(new_name) = self.rename.get(&meta.name) {
                meta.name = new_name.clone();
            }
            metas.push(meta);
            fields.push((pos, conversion));
        }
        Ok(Layout {
            input: Arc::clone(input),
            output: Arc::new(RowSchema::new(metas)),
            fields,
        })
    }

    fn layout_for(&mut self, input: &Arc<RowSchema>) -> Result<&Layout, StepError> {
        let stale = match &self.layout {
            Some(l) => !Arc::ptr_eq(&l.input, input) && !l.input.same_layout(input),
            None => true,
        };
        if stale {
            self.layout = Some(self.build_layout(input)?);
        }
        self.layout
            .as_ref()
            .ok_or_else(|| StepError::Fatal("select: layout missing".into()))
    }

    fn transform(&mut self, row: Row) -> Result<Result<Row, StepError>, StepError> {
        let layout = self.layout_for(row.schema())?;
        let mut values = Vec::with_capacity(layout.fields.len());
        for &(pos, conversion) in &layout.fields {
            let v = row.values()[pos].clone();
            match conversion {
                Some(t) => match v.convert_to(t) {
                    Ok(c) => values.push(c),
                    Err(e) => return Ok(Err(e.into())),
                },
                None => values.push(v),
            }
        }
        Ok(Ok(Row::new(Arc::clone(&layout.output), values)?))
    }
}

impl StepLogic for SelectValues {
    fn init(&mut self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let cfg: SelectConfig = ctx.parse_config()?;
        self.convert = cfg
            .convert
            .into_iter()
            .map(|(field, ty)| {
                DataType::parse(&ty)
                    .map(|t| (field.clone(), t))
                    .ok_or_else(|| StepError::Config(format!("convert '{field}': unknown type '{ty}'")))
            })
            .collect::<Result<_, _>>()?;
        self.select = cfg.select;
        self.rename = cfg.rename;
        self.layout = None;
        Ok(())
    }

    fn process_batch(&mut self, io: &mut StepIo) -> Result<BatchOutcome, StepError> {
        for _ in 0..io.batch_rows() {
            let Some(row) = io.get_row()? else {
                return Ok(BatchOutcome::Finished);
            };
            match self.transform(row)? {
                Ok(out) => io.put_row(out)?,
                Err(e) => io.data_error(e)?,
            }
        }
        Ok(BatchOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{init_step, rows, run_to_end, try_run_to_end, Harness};
    use hopline_core::graph::{DataErrorPolicy, StepMeta};
    use hopline_core::schema::ValueMeta;
    use hopline_core::types::Value;
    use serde_json::json;

    fn input_rows(texts: &[&str]) -> Vec<Row> {
        let schema = Arc::new(RowSchema::new(vec![
            ValueMeta::new("code", DataType::String),
            ValueMeta::new("qty", DataType::String),
        ]));
        texts
            .iter()
            .map(|t| {
                Row::new(
                    Arc::clone(&schema),
                    vec![Value::String("K".into()), Value::String((*t).into())],
                )
                .unwrap()
            })
            .collect()
    }

    fn step(config: serde_json::Value) -> Result<SelectValues, StepError> {
        let meta = StepMeta::new("select", "select_values").with_config(config);
        let mut s = SelectValues::default();
        init_step(&mut s, &meta, &["in0"], &["out0"])?;
        Ok(s)
    }

    #[test]
    fn selects_renames_and_converts() {
        let h = Harness::new(1, 1);
        h.feed_rows(0, input_rows(&["3", "4"]));
        let (mut io, out) = h.into_parts();

        let mut s = step(json!({
            "select": ["qty"],
            "rename": {"qty": "quantity"},
            "convert": {"qty": "Integer"}
        }))
        .unwrap();
        run_to_end(&mut s, &mut io);

        let got = rows(&out[0]);
        assert_eq!(got.len(), 2);
        let schema = got[0].schema();
        assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["quantity"]);
        assert_eq!(schema.field(0).unwrap().data_type, DataType::Integer);
        assert_eq!(got[1].values(), &[Value::Integer(4)]);
        assert!(Arc::ptr_eq(got[0].schema(), got[1].schema()));
    }

    #[test]
    fn failed_conversion_is_skipped_or_fatal_per_policy() {
        let h = Harness::new(1, 1).with_policy(DataErrorPolicy::Skip);
        h.feed_rows(0, input_rows(&["1", "x", "2"]));
        let (mut io, out) = h.into_parts();
        let mut s = step(json!({"convert": {"qty": "Integer"}})).unwrap();
        run_to_end(&mut s, &mut io);
        assert_eq!(rows(&out[0]).len(), 2);
        assert_eq!(io.counters().errors(), 1);

        let h = Harness::new(1, 1);
        h.feed_rows(0, input_rows(&["x"]));
        let (mut io, _out) = h.into_parts();
        let mut s = step(json!({"convert": {"qty": "Integer"}})).unwrap();
        assert!(matches!(
            try_run_to_end(&mut s, &mut io),
            Err(StepError::Data(_))
        ));
    }

    #[test]
    fn unknown_field_is_fatal() {
        let h = Harness::new(1, 1);
        h.feed_rows(0, input_rows(&["1"]));
        let (mut io, _out) = h.into_parts();
        let mut s = step(json!({"select": ["missing"]})).unwrap();
        assert!(matches!(
            try_run_to_end(&mut s, &mut io),
            Err(StepError::Fatal(_))
        ));
    }

    #[test]
    fn unknown_type_fails_init() {
        assert!(matches!(
            step(json!({"convert": {"qty": "Tensor"}})).err(),
            Some(StepError::Config(_))
        ));
    }
}
