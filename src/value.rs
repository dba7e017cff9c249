//! Bind-parameter and result value types shared by the database backends

use crate::db::DbError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A SQL value, used both as a bind parameter and as a decoded result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),

    /// 64-bit floating point (also carries decoded DECIMAL columns)
    Float(f64),

    /// Text/string value
    Text(String),

    /// Timestamp without time zone
    Timestamp(NaiveDateTime),

    /// NULL value
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
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

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// One decoded result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Row(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Result<&Value, DbError> {
        self.0
            .get(idx)
            .ok_or_else(|| DbError::Decode(format!("column index {} out of range", idx)))
    }

    pub fn get_i64(&self, idx: usize) -> Result<i64, DbError> {
        match self.get(idx)? {
            Value::Int(v) => Ok(*v),
            other => Err(DbError::Decode(format!(
                "column {}: expected integer, got {}",
                idx, other
            ))),
        }
    }

    /// Integer column that may be NULL.
    pub fn opt_i64(&self, idx: usize) -> Result<Option<i64>, DbError> {
        match self.get(idx)? {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            other => Err(DbError::Decode(format!(
                "column {}: expected integer or NULL, got {}",
                idx, other
            ))),
        }
    }

    /// Float column; integer cells coerce (SQLite stores DECIMAL loosely).
    pub fn get_f64(&self, idx: usize) -> Result<f64, DbError> {
        match self.get(idx)? {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(DbError::Decode(format!(
                "column {}: expected float, got {}",
                idx, other
            ))),
        }
    }

    pub fn get_str(&self, idx: usize) -> Result<&str, DbError> {
        match self.get(idx)? {
            Value::Text(v) => Ok(v.as_str()),
            other => Err(DbError::Decode(format!(
                "column {}: expected text, got {}",
                idx, other
            ))),
        }
    }
}

/// Builds a `&[Value]` bind-parameter slice from heterogeneous literals.
#[macro_export]
macro_rules! bind {
    () => {
        &[] as &[$crate::value::Value]
    };
    ($($v:expr),+ $(,)?) => {
        &[$($crate::value::Value::from($v)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let row = Row::new(vec![
            Value::Int(42),
            Value::Float(1.5),
            Value::Text("hello".into()),
            Value::Null,
        ]);
        assert_eq!(row.get_i64(0).unwrap(), 42);
        assert_eq!(row.get_f64(1).unwrap(), 1.5);
        assert_eq!(row.get_f64(0).unwrap(), 42.0); // int coerces to float
        assert_eq!(row.get_str(2).unwrap(), "hello");
        assert_eq!(row.opt_i64(3).unwrap(), None);
        assert!(row.get_i64(1).is_err());
        assert!(row.get_i64(9).is_err());
    }

    #[test]
    fn test_bind_macro() {
        let params = bind!(1i64, 2.5, "x");
        assert_eq!(
            params,
            &[Value::Int(1), Value::Float(2.5), Value::Text("x".into())]
        );
        let empty = bind!();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(Some(7i64)), Value::Int(7));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }
}
