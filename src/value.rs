//! Cell values and rows returned by the embedded engine
//!
//! Result rows keep their column order so that scalar and single-column
//! extraction ("first column of the first row") stays well defined. The
//! engine's wide-integer type (`HugeInt`) does not interoperate with ordinary
//! host arithmetic, so every query result is normalized before it is published.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a single cell in a result [`Row`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// Wide integer as produced by the engine's 64-bit-plus column types.
    /// Normalized away by [`Value::normalized`] before rows are published.
    HugeInt(i128),
    Float(f64),
    Text(String),
}

impl Value {
    /// Collapse `HugeInt` into an ordinary numeric representation: `Int` when
    /// the value fits in an `i64`, `Float` otherwise. All other variants pass
    /// through unchanged.
    pub fn normalized(self) -> Value {
        match self {
            Value::HugeInt(v) => match i64::try_from(v) {
                Ok(n) => Value::Int(n),
                Err(_) => Value::Float(v as f64),
            },
            other => other,
        }
    }

    /// Try to extract an f64 for numeric use
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::HugeInt(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to extract an i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::HugeInt(i) => i64::try_from(*i).ok(),
            _ => None,
        }
    }

    /// Borrow the text content, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert into a `serde_json::Value` for callers that hand rows to
    /// JSON-speaking consumers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::HugeInt(i) => match i64::try_from(*i) {
                Ok(n) => serde_json::Value::from(n),
                Err(_) => serde_json::Value::from(*i as f64),
            },
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Text(s) => serde_json::Value::from(s.clone()),
        }
    }
}

/// Raw (unquoted) SQL rendering: numerics and booleans as literals, text as-is.
/// Quoting and escaping is the fragment library's job.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::HugeInt(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::HugeInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One result row: ordered (column, value) cells
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new(cells: Vec<(String, Value)>) -> Self {
        Row { cells }
    }

    /// Look up a cell by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Value of the first column, if the row has any cells
    pub fn first_value(&self) -> Option<&Value> {
        self.cells.first().map(|(_, value)| value)
    }

    /// Column names in result order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Normalize every cell (see [`Value::normalized`])
    pub fn normalized(self) -> Row {
        Row {
            cells: self
                .cells
                .into_iter()
                .map(|(name, value)| (name, value.normalized()))
                .collect(),
        }
    }

    /// Render as a JSON object, preserving nothing but name/value pairs
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.cells {
            map.insert(name.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row {
            cells: iter.into_iter().collect(),
        }
    }
}
