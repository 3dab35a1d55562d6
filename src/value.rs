//! Runtime values carried by view rows, and JDBC-type driven masking.
//!
//! A [`Row`] is a string-keyed map whose values are scalars, nested rows
//! (one-to-one associations) or lists (collections).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::sql::expr::{lit_bool, lit_float, lit_int, lit_null, lit_str, Expr};

/// Text form of timestamps exchanged with the database.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIMESTAMP_FORMAT_FRACTIONAL: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Format a timestamp, with fractional seconds only when non-zero.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format(TIMESTAMP_FORMAT).to_string()
    } else {
        ts.format(TIMESTAMP_FORMAT_FRACTIONAL).to_string()
    }
}

/// Parse a timestamp in `YYYY-MM-DD HH:MM:SS[.f]`, ISO `T` form, or a bare date.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT_FRACTIONAL)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ============================================================================
// Value
// ============================================================================

/// A value in a view row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    List(Vec<Value>),
    Row(Row),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Value::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_row_mut(&mut self) -> Option<&mut Row> {
        match self {
            Value::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for `Null` and for nested rows whose every value is null.
    pub fn is_all_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Row(row) => row.is_all_null(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                let mut buffer = ryu::Buffer::new();
                f.write_str(buffer.format(*x))
            }
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Row(row) => {
                f.write_str("{")?;
                for (i, (key, value)) in row.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Row> for Value {
    fn from(row: Row) -> Self {
        Value::Row(row)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Row
// ============================================================================

/// A string-keyed map of values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Get the slot for `key`, inserting `Null` when absent.
    pub fn slot(&mut self, key: &str) -> &mut Value {
        self.0.entry(key.to_string()).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_all_null(&self) -> bool {
        self.0.values().all(Value::is_all_null)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Row(iter.into_iter().collect())
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ============================================================================
// JDBC types
// ============================================================================

/// Column type tag: drives literal masking and value binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JdbcType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Double,
    Char,
    #[default]
    Varchar,
    Date,
    Timestamp,
    Other,
}

impl JdbcType {
    pub fn is_integral(self) -> bool {
        matches!(self, JdbcType::SmallInt | JdbcType::Integer | JdbcType::BigInt)
    }

    pub fn is_fractional(self) -> bool {
        matches!(self, JdbcType::Decimal | JdbcType::Double)
    }

    pub fn is_textual(self) -> bool {
        matches!(self, JdbcType::Char | JdbcType::Varchar)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, JdbcType::Date | JdbcType::Timestamp)
    }

    /// Render a value as an SQL literal masked for this column type.
    pub fn literal(self, value: &Value) -> Expr {
        match self.coerce(value.clone()) {
            Value::Null => lit_null(),
            Value::Bool(b) => lit_bool(b),
            Value::Int(n) => lit_int(n),
            Value::Float(x) => lit_float(x),
            Value::Text(s) => lit_str(&s),
            Value::Timestamp(ts) => lit_str(&format_timestamp(&ts)),
            other @ (Value::List(_) | Value::Row(_)) => lit_str(&other.to_string()),
        }
    }

    /// Normalise a value to this column type where a lossless conversion exists.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,

            (JdbcType::Boolean, Value::Int(n)) => Value::Bool(n != 0),
            (JdbcType::Boolean, Value::Text(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => Value::Text(s),
            },

            (t, Value::Float(x)) if t.is_integral() && x.fract() == 0.0 => Value::Int(x as i64),
            (t, Value::Bool(b)) if t.is_integral() => Value::Int(b as i64),
            (t, Value::Text(s)) if t.is_integral() => match s.trim().parse::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => Value::Text(s),
            },

            (t, Value::Int(n)) if t.is_fractional() => Value::Float(n as f64),
            (t, Value::Text(s)) if t.is_fractional() => match s.trim().parse::<f64>() {
                Ok(x) => Value::Float(x),
                Err(_) => Value::Text(s),
            },

            (t, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) if t.is_textual() => {
                Value::Text(v.to_string())
            }
            (t, Value::Timestamp(ts)) if t.is_textual() => Value::Text(format_timestamp(&ts)),

            (t, Value::Text(s)) if t.is_temporal() => match parse_timestamp(&s) {
                Some(ts) => Value::Timestamp(ts),
                None => Value::Text(s),
            },

            (_, v) => v,
        }
    }
}
