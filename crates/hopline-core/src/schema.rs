//! Row schemas: ordered field descriptors. Pure data.
//!
//! Field order and identity are significant. A consumer that reads positions
//! `[0, 2]` only needs the producer's schema to agree at those positions.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Integer,
    Number,
    BigNumber,
    Date,
    Boolean,
    Binary,
}

impl DataType {
    /// Parse the type names accepted in graph files.
    pub fn parse(s: &str) -> Option<Self> {
        let t = match s {
            "String" | "string" | "Utf8" | "str" => DataType::String,
            "Integer" | "integer" | "int" | "Int64" | "i64" => DataType::Integer,
            "Number" | "number" | "Float64" | "f64" => DataType::Number,
            "BigNumber" | "bignumber" | "decimal" => DataType::BigNumber,
            "Date" | "date" => DataType::Date,
            "Boolean" | "boolean" | "bool" => DataType::Boolean,
            "Binary" | "binary" | "bytes" => DataType::Binary,
            _ => return None,
        };
        Some(t)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One field descriptor of a row schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMeta {
    pub name: String,
    pub data_type: DataType,
    /// Optional display/conversion mask (e.g. a date pattern).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

impl ValueMeta {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            format: None,
            length: None,
            precision: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_precision(mut self, length: u32, precision: u32) -> Self {
        self.length = Some(length);
        self.precision = Some(precision);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSchema {
    pub fields: Vec<ValueMeta>,
}

impl RowSchema {
    pub fn new(fields: Vec<ValueMeta>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&ValueMeta> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// True when both schemas agree (name and type) at every position in `positions`.
    pub fn compatible_at(&self, other: &RowSchema, positions: &[usize]) -> bool {
        positions.iter().all(|&i| match (self.field(i), other.field(i)) {
            (Some(a), Some(b)) => a.name == b.name && a.data_type == b.data_type,
            _ => false,
        })
    }

    /// Same field sequence: identical names and types in the same order.
    pub fn same_layout(&self, other: &RowSchema) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name && a.data_type == b.data_type)
    }
}
