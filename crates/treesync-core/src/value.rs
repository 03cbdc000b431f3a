//! Primitive values carried by scalar fields and primitive maps.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A primitive value: the only thing a scalar field or a primitive map
/// entry can hold.
///
/// Serialized untagged, so JSON carries plain `true`, `3`, `2.5` or `"x"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats here, so numeric readers don't have to care
    /// which of the two the wire produced.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert `self` to the kind of `template`, the field's declared default.
    ///
    /// `Int` widens into a `Float` field; every other mismatch is an error,
    /// as is a NaN or infinite float.
    pub fn conform_to(self, template: &Value, field: &str) -> Result<Value> {
        let value = match (template, self) {
            (Value::Float(_), Value::Int(i)) => Value::Float(i as f64),
            (t, v) if t.kind() == v.kind() => v,
            (t, v) => {
                return Err(SyncError::TypeMismatch {
                    field: field.to_string(),
                    expected: t.kind(),
                    found: v.kind(),
                })
            }
        };
        value.ensure_finite(field)
    }

    /// JSON has no encoding for NaN or the infinities (they serialize as
    /// `null`), so they never enter a tree.
    pub fn ensure_finite(self, field: &str) -> Result<Value> {
        match self {
            Value::Float(x) if !x.is_finite() => {
                Err(SyncError::NonFiniteFloat(field.to_string()))
            }
            other => Ok(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x as f64)
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
