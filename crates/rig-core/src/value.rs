//! Tagged scalar value type used for function arguments and signal readings.

use serde::{Deserialize, Serialize};

/// Scalar value carried on the wire and between devices and the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Double(f64),
    Int64(i64),
    Bool(bool),
    String(String),
}

impl Value {
    /// Get the double value, if this is a double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the int64 value, if this is an int64.
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the bool value, if this is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Coerce to a number: doubles pass through, int64 widens, bool maps to
    /// 0/1. Strings have no numeric reading.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int64(v) => Some(*v as f64),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::String(_) => None,
        }
    }

    /// Name of the carried type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Double(_) => "double",
            Self::Int64(_) => "int64",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        assert_eq!(Value::Double(2.5).as_double(), Some(2.5));
        assert_eq!(Value::Int64(3).as_int64(), Some(3));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::String("x".into()).as_str(), Some("x"));
        assert_eq!(Value::Double(2.5).as_bool(), None);
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::Double(1.5).as_numeric(), Some(1.5));
        assert_eq!(Value::Int64(-2).as_numeric(), Some(-2.0));
        assert_eq!(Value::Bool(true).as_numeric(), Some(1.0));
        assert_eq!(Value::Bool(false).as_numeric(), Some(0.0));
        assert_eq!(Value::String("7".into()).as_numeric(), None);
    }

    #[test]
    fn serde_round_trip() {
        let v = Value::Int64(42);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
