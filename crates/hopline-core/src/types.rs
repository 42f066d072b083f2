//! Typed values and rows.
//!
//! A `Row` is a fixed-length sequence of values positionally aligned to a
//! shared `RowSchema`. Rows are treated as immutable once handed to a channel.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, RowSchema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Number(f64),
    /// Fixed-point decimal: `unscaled * 10^-scale`.
    BigNumber { unscaled: i128, scale: u32 },
    /// Milliseconds since the Unix epoch (UTC).
    Date(i64),
    Boolean(bool),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Natural type of this value; `None` for nulls.
    pub fn data_type(&self) -> Option<DataType> {
        let t = match self {
            Value::Null => return None,
            Value::String(_) => DataType::String,
            Value::Integer(_) => DataType::Integer,
            Value::Number(_) => DataType::Number,
            Value::BigNumber { .. } => DataType::BigNumber,
            Value::Date(_) => DataType::Date,
            Value::Boolean(_) => DataType::Boolean,
            Value::Binary(_) => DataType::Binary,
        };
        Some(t)
    }

    /// Build a decimal from its textual form, e.g. `"123.45"`.
    pub fn big_number(text: &str) -> Result<Value> {
        parse_decimal(text)
            .map(|(unscaled, scale)| Value::BigNumber { unscaled, scale })
            .ok_or_else(|| conversion_error(&Value::String(text.to_string()), DataType::BigNumber, "not a decimal"))
    }

    /// Convert to `target`. Nulls stay null; failures are reported as
    /// `Error::Conversion` so steps can treat them as per-row data errors.
    pub fn convert_to(&self, target: DataType) -> Result<Value> {
        if self.is_null() || self.data_type() == Some(target) {
            return Ok(self.clone());
        }
        let out = match (self, target) {
            (_, DataType::String) => match self {
                Value::Binary(b) => Value::String(
                    String::from_utf8(b.clone())
                        .map_err(|_| conversion_error(self, target, "invalid utf-8"))?,
                ),
                Value::Boolean(b) => Value::String(if *b { "Y" } else { "N" }.to_string()),
                other => Value::String(other.to_string()),
            },

            (Value::String(s), DataType::Integer) => Value::Integer(
                s.trim()
                    .parse::<i64>()
                    .map_err(|e| conversion_error(self, target, &e.to_string()))?,
            ),
            (Value::Number(n), DataType::Integer) => {
                if !n.is_finite() {
                    return Err(conversion_error(self, target, "not finite"));
                }
                let r = n.round();
                // i64::MAX as f64 rounds up to 2^63, which is already out of range.
                if r < i64::MIN as f64 || r >= i64::MAX as f64 {
                    return Err(conversion_error(self, target, "out of range"));
                }
                Value::Integer(r as i64)
            }
            (Value::BigNumber { unscaled, scale }, DataType::Integer) => {
                let v = unscaled / pow10(*scale).ok_or_else(|| conversion_error(self, target, "scale overflow"))?;
                Value::Integer(
                    i64::try_from(v).map_err(|_| conversion_error(self, target, "out of range"))?,
                )
            }
            (Value::Date(ms), DataType::Integer) => Value::Integer(*ms),
            (Value::Boolean(b), DataType::Integer) => Value::Integer(i64::from(*b)),

            (Value::String(s), DataType::Number) => Value::Number(
                s.trim()
                    .parse::<f64>()
                    .map_err(|e| conversion_error(self, target, &e.to_string()))?,
            ),
            (Value::Integer(i), DataType::Number) => Value::Number(*i as f64),
            (Value::BigNumber { unscaled, scale }, DataType::Number) => {
                Value::Number(*unscaled as f64 / 10f64.powi(*scale as i32))
            }
            (Value::Date(ms), DataType::Number) => Value::Number(*ms as f64),
            (Value::Boolean(b), DataType::Number) => Value::Number(if *b { 1.0 } else { 0.0 }),

            (Value::String(s), DataType::BigNumber) => Value::big_number(s.trim())?,
            (Value::Integer(i), DataType::BigNumber) => Value::BigNumber {
                unscaled: i128::from(*i),
                scale: 0,
            },
            (Value::Number(n), DataType::BigNumber) => {
                if !n.is_finite() {
                    return Err(conversion_error(self, target, "not finite"));
                }
                Value::big_number(&n.to_string())?
            }

            (Value::String(s), DataType::Date) => Value::Date(
                s.trim()
                    .parse::<i64>()
                    .map_err(|e| conversion_error(self, target, &e.to_string()))?,
            ),
            (Value::Integer(i), DataType::Date) => Value::Date(*i),

            (Value::String(s), DataType::Boolean) => match s.trim() {
                "Y" | "y" | "true" | "TRUE" | "True" | "1" => Value::Boolean(true),
                "N" | "n" | "false" | "FALSE" | "False" | "0" => Value::Boolean(false),
                _ => return Err(conversion_error(self, target, "not a boolean")),
            },
            (Value::Integer(i), DataType::Boolean) => Value::Boolean(*i != 0),
            (Value::Number(n), DataType::Boolean) => Value::Boolean(*n != 0.0),

            (Value::String(s), DataType::Binary) => Value::Binary(s.as_bytes().to_vec()),

            _ => return Err(conversion_error(self, target, "unsupported conversion")),
        };
        Ok(out)
    }

    /// Total ordering used for sorting and comparisons.
    ///
    /// Nulls sort first; values of different types order by type.
    pub fn compare(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (String(a), String(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Number(a), Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    Ordering::Equal
                } else if a.is_nan() {
                    Ordering::Greater
                } else if b.is_nan() {
                    Ordering::Less
                } else {
                    a.partial_cmp(b).unwrap_or(Ordering::Equal)
                }
            }
            (
                BigNumber {
                    unscaled: a,
                    scale: sa,
                },
                BigNumber {
                    unscaled: b,
                    scale: sb,
                },
            ) => cmp_decimal(*a, *sa, *b, *sb),
            (Date(a), Date(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Binary(a), Binary(b)) => a.cmp(b),
            _ => type_order(self).cmp(&type_order(other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("<null>"),
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::BigNumber { unscaled, scale } => f.write_str(&format_decimal(*unscaled, *scale)),
            Value::Date(ms) => write!(f, "{ms}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Binary(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// One record, positionally aligned to its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<RowSchema>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row; the value count must match the schema length.
    pub fn new(schema: Arc<RowSchema>, values: Vec<Value>) -> Result<Self> {
        if schema.len() != values.len() {
            return Err(Error::Schema(format!(
                "row has {} values but schema has {} fields",
                values.len(),
                schema.len()
            )));
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Look a value up by field name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn into_parts(self) -> (Arc<RowSchema>, Vec<Value>) {
        (self.schema, self.values)
    }

    /// Compare two rows on the given field positions, in order.
    pub fn compare(&self, other: &Row, fields: &[usize]) -> Ordering {
        for &i in fields {
            let ord = match (self.values.get(i), other.values.get(i)) {
                (Some(a), Some(b)) => a.compare(b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

// --- helpers ---

fn conversion_error(value: &Value, target: DataType, reason: &str) -> Error {
    Error::Conversion {
        value: value.to_string(),
        target,
        reason: reason.to_string(),
    }
}

/// Assign a numeric order to value types for mixed-type comparisons.
fn type_order(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Boolean(_) => 1,
        Value::Integer(_) => 2,
        Value::Number(_) => 3,
        Value::BigNumber { .. } => 4,
        Value::Date(_) => 5,
        Value::String(_) => 6,
        Value::Binary(_) => 7,
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

fn cmp_decimal(a: i128, sa: u32, b: i128, sb: u32) -> Ordering {
    let scale = sa.max(sb);
    let lhs = pow10(scale - sa).and_then(|m| a.checked_mul(m));
    let rhs = pow10(scale - sb).and_then(|m| b.checked_mul(m));
    match (lhs, rhs) {
        (Some(l), Some(r)) => l.cmp(&r),
        // Out of i128 range after rescaling; fall back to floating point.
        _ => {
            let l = a as f64 / 10f64.powi(sa as i32);
            let r = b as f64 / 10f64.powi(sb as i32);
            l.partial_cmp(&r).unwrap_or(Ordering::Equal)
        }
    }
}

fn parse_decimal(text: &str) -> Option<(i128, u32)> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut unscaled: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        unscaled = unscaled
            .checked_mul(10)?
            .checked_add(i128::from(c.to_digit(10)?))?;
    }
    let scale = u32::try_from(frac_part.len()).ok()?;
    Some((if negative { -unscaled } else { unscaled }, scale))
}

fn format_decimal(unscaled: i128, scale: u32) -> String {
    if scale == 0 {
        return unscaled.to_string();
    }
    let digits = unscaled.unsigned_abs().to_string();
    let scale = scale as usize;
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let sign = if unscaled < 0 { "-" } else { "" };
    format!("{sign}{int_part}.{frac_part}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueMeta;

    fn schema() -> Arc<RowSchema> {
        Arc::new(RowSchema::new(vec![
            ValueMeta::new("field1", DataType::String),
            ValueMeta::new("field2", DataType::Integer),
        ]))
    }

    #[test]
    fn row_rejects_wrong_arity() {
        let err = Row::new(schema(), vec![Value::Integer(1)]).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn row_lookup_and_compare() {
        let a = Row::new(
            schema(),
            vec![Value::String("KETTLE1".into()), Value::Integer(123)],
        )
        .unwrap();
        let b = Row::new(
            schema(),
            vec![Value::String("KETTLE1".into()), Value::Integer(500)],
        )
        .unwrap();

        assert_eq!(a.get("field2"), Some(&Value::Integer(123)));
        assert_eq!(a.compare(&b, &[0]), Ordering::Equal);
        assert_eq!(a.compare(&b, &[0, 1]), Ordering::Less);
    }

    #[test]
    fn decimals_round_trip_through_text() {
        let v = Value::big_number("123.60").unwrap();
        assert_eq!(
            v,
            Value::BigNumber {
                unscaled: 12360,
                scale: 2
            }
        );
        assert_eq!(v.to_string(), "123.60");
        assert_eq!(Value::big_number("-0.05").unwrap().to_string(), "-0.05");
        assert!(Value::big_number("12a").is_err());

        let a = Value::big_number("123.6").unwrap();
        assert_eq!(a.compare(&v), Ordering::Equal);
        assert_eq!(
            Value::big_number("123.45").unwrap().compare(&v),
            Ordering::Less
        );
    }

    #[test]
    fn number_to_integer_rejects_out_of_range() {
        assert_eq!(
            Value::Number(2.5).convert_to(DataType::Integer).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            Value::Number(-9.223_372_036_854_776e18)
                .convert_to(DataType::Integer)
                .unwrap(),
            Value::Integer(i64::MIN)
        );
        for n in [1e30, -1e30, 9.223_372_036_854_776e18] {
            assert!(matches!(
                Value::Number(n).convert_to(DataType::Integer),
                Err(Error::Conversion { ref reason, .. }) if reason == "out of range"
            ));
        }
    }

    #[test]
    fn conversions() {
        assert_eq!(
            Value::String(" 42 ".into()).convert_to(DataType::Integer).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            Value::Integer(7).convert_to(DataType::String).unwrap(),
            Value::String("7".into())
        );
        assert_eq!(
            Value::String("N".into()).convert_to(DataType::Boolean).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(Value::Null.convert_to(DataType::Date).unwrap(), Value::Null);

        let err = Value::String("abc".into())
            .convert_to(DataType::Integer)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conversion {
                target: DataType::Integer,
                ..
            }
        ));
    }

    #[test]
    fn nulls_sort_first_and_nan_last() {
        assert_eq!(Value::Null.compare(&Value::Integer(0)), Ordering::Less);
        assert_eq!(
            Value::Number(f64::NAN).compare(&Value::Number(1.0)),
            Ordering::Greater
        );
    }
}
