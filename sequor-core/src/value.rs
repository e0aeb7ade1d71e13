//! Dynamic value type for sequence variables and expression results.
//!
//! Every value flowing through a sequence (constants, on-the-fly
//! variables, function arguments and returns, expression results) is a
//! [`Value`]. Wrapping `serde_json::Value` keeps the engine independent of
//! any particular host type system, and makes the copy-isolation rule
//! trivial: a `Value` is owned data, so handing one to a user function can
//! never alias engine state.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Dynamic value for sequence variables and condition evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(pub JsonValue);

impl Value {
    /// Create a null value.
    pub fn null() -> Self {
        Self(JsonValue::Null)
    }

    /// Create a boolean value.
    pub fn bool(v: bool) -> Self {
        Self(JsonValue::Bool(v))
    }

    /// Create an integer value.
    pub fn int(v: i64) -> Self {
        Self(JsonValue::Number(v.into()))
    }

    /// Create a floating-point value.
    ///
    /// Non-finite inputs map to null, since JSON has no representation
    /// for them.
    pub fn float(v: f64) -> Self {
        Self(serde_json::Number::from_f64(v).map_or(JsonValue::Null, JsonValue::Number))
    }

    /// Create a string value.
    pub fn string(v: impl Into<String>) -> Self {
        Self(JsonValue::String(v.into()))
    }

    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Convert to i64 if the value is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match &self.0 {
            JsonValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_u64().and_then(|v| i64::try_from(v).ok())),
            _ => None,
        }
    }

    /// Convert to f64 if the value is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.0 {
            JsonValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Convert to bool if the value is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        self.0.as_bool()
    }

    /// Borrow the string contents if the value is a string.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Python-style truthiness: null and empty containers are false,
    /// zero is false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match &self.0 {
            JsonValue::Null => false,
            JsonValue::Bool(b) => *b,
            JsonValue::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            JsonValue::String(s) => !s.is_empty(),
            JsonValue::Array(items) => !items.is_empty(),
            JsonValue::Object(map) => !map.is_empty(),
        }
    }

    /// A short name for the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match &self.0 {
            JsonValue::Null => "null",
            JsonValue::Bool(_) => "bool",
            JsonValue::Number(_) => "number",
            JsonValue::String(_) => "string",
            JsonValue::Array(_) => "list",
            JsonValue::Object(_) => "object",
        }
    }

    /// Access the inner `serde_json::Value`.
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert into the inner `serde_json::Value`.
    pub fn into_inner(self) -> JsonValue {
        self.0
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            JsonValue::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Self(v)
    }
}

impl From<Value> for JsonValue {
    fn from(v: Value) -> Self {
        v.0
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::bool(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self(JsonValue::Array(
            items.into_iter().map(|v| v.into().0).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors() {
        assert!(Value::null().is_null());
        assert_eq!(Value::int(3).as_i64(), Some(3));
        assert_eq!(Value::float(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::bool(true).as_bool(), Some(true));
        assert_eq!(Value::string("hi").as_str(), Some("hi"));
    }

    #[test]
    fn non_finite_float_is_null() {
        assert!(Value::float(f64::NAN).is_null());
        assert!(Value::float(f64::INFINITY).is_null());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::null().is_truthy());
        assert!(!Value::int(0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value(json!([])).is_truthy());
        assert!(!Value(json!({})).is_truthy());
        assert!(Value::int(1).is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(Value(json!([0])).is_truthy());
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::null().type_name(), "null");
        assert_eq!(Value(json!([1, 2])).type_name(), "list");
        assert_eq!(Value(json!({"a": 1})).type_name(), "object");
    }

    #[test]
    fn display_strings_unquoted() {
        assert_eq!(format!("{}", Value::string("spam")), "spam");
        assert_eq!(format!("{}", Value::int(2)), "2");
        assert_eq!(format!("{}", Value(json!([1, 2]))), "[1,2]");
    }
}
