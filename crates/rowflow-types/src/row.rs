//! Row transport types: values, column descriptors, schemas, and rows.
//!
//! A [`Row`] is the unit that flows through the graph: a fixed-arity
//! vector of [`Value`]s paired with its [`RowSchema`]. Rows are
//! immutable once handed to a row set; a step fanning the same row out
//! to several destinations clones it once per destination.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Semantic type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Text,
    Binary,
    /// RFC-3339 formatted timestamp text.
    Timestamp,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

/// A single column value.
///
/// `Null` is legal in any column regardless of its declared kind; type
/// checks beyond transport are the concern of individual steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    /// RFC-3339 formatted timestamp text.
    Timestamp(String),
}

impl Value {
    /// The [`ColumnKind`] this value carries, or `None` for `Null`.
    #[must_use]
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(ColumnKind::Boolean),
            Self::Integer(_) => Some(ColumnKind::Integer),
            Self::Float(_) => Some(ColumnKind::Float),
            Self::Text(_) => Some(ColumnKind::Text),
            Self::Binary(_) => Some(ColumnKind::Binary),
            Self::Timestamp(_) => Some(ColumnKind::Timestamp),
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) | Self::Timestamp(v) => f.write_str(v),
            Self::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Name and semantic type of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered list of column descriptors describing a row's layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowSchema {
    columns: Vec<ColumnDescriptor>,
}

impl RowSchema {
    #[must_use]
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The descriptors, in column order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Position of the named column, if present.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// A new schema with `extra` columns appended after the existing
    /// ones. Used to build augmented layouts for diverted rows.
    #[must_use]
    pub fn with_columns(&self, extra: &[ColumnDescriptor]) -> Self {
        let mut columns = self.columns.clone();
        columns.extend_from_slice(extra);
        Self { columns }
    }
}

/// One fixed-arity tuple of values flowing through the graph.
///
/// The schema is shared by reference: every row emitted by one step
/// copy typically points at the same `Arc<RowSchema>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<RowSchema>,
    values: Vec<Value>,
}

impl Row {
    /// Pair values with their schema.
    ///
    /// # Panics
    ///
    /// Panics if the value count does not match the schema arity; a
    /// mismatched row is a step implementation bug, never recoverable
    /// engine state.
    #[must_use]
    pub fn new(schema: Arc<RowSchema>, values: Vec<Value>) -> Self {
        assert_eq!(
            schema.len(),
            values.len(),
            "row arity {} does not match schema arity {}",
            values.len(),
            schema.len()
        );
        Self { schema, values }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at `index`, if in range.
    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the named column, if the schema declares it.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.schema.field_index(name).and_then(|i| self.values.get(i))
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decompose into schema and values (used when augmenting a row
    /// with extra columns).
    #[must_use]
    pub fn into_parts(self) -> (Arc<RowSchema>, Vec<Value>) {
        (self.schema, self.values)
    }
}
