//! `TypedValue`: the (DataType, payload) pair carried along chain edges.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// The declared shape of a value flowing between tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Number,
    ChatHistory,
    SearchResults,
    Json,
    Any,
}

/// A value tagged with its `DataType`. Edges carry `TypedValue`s; tasks declare
/// the types they accept. A mismatch between a task's declared input type and
/// the `TypedValue` it receives is a chain-fatal error routed to `onFailure`
/// (see [`crate::engine`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedValue {
    pub data_type: DataType,
    pub payload: Value,
}

impl TypedValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            data_type: DataType::String,
            payload: Value::String(s.into()),
        }
    }

    pub fn number(n: f64) -> Self {
        Self {
            data_type: DataType::Number,
            payload: serde_json::json!(n),
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            data_type: DataType::Json,
            payload: value,
        }
    }

    pub fn any(value: Value) -> Self {
        Self {
            data_type: DataType::Any,
            payload: value,
        }
    }

    /// Renders the payload as its string form for string-operator comparisons
    /// and template interpolation: string operators compare the rendered
    /// string form of the output.
    pub fn render_string(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Parses the rendered string form as a decimal, for numeric operators and
    /// `ParseNumber` tasks. Non-numeric payloads fail with `CoreError::BadRequest`.
    pub fn as_number(&self) -> Result<f64, CoreError> {
        self.render_string()
            .trim()
            .parse::<f64>()
            .map_err(|e| CoreError::BadRequest(format!("expected numeric value: {e}")))
    }

    /// Checks this value's type against a task's declared accepted type. `Any`
    /// accepts everything in either direction.
    pub fn matches_type(&self, expected: DataType) -> bool {
        expected == DataType::Any || self.data_type == expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_string_unwraps_json_string() {
        let v = TypedValue::string("hello");
        assert_eq!(v.render_string(), "hello");
    }

    #[test]
    fn render_string_stringifies_non_string_payload() {
        let v = TypedValue::number(42.0);
        assert_eq!(v.render_string(), "42.0");
    }

    #[test]
    fn as_number_parses_decimal_from_string_payload() {
        let v = TypedValue::string("  7  ");
        assert_eq!(v.as_number().unwrap(), 7.0);
    }

    #[test]
    fn as_number_rejects_non_numeric_payload() {
        let v = TypedValue::string("not a number");
        assert!(v.as_number().is_err());
    }

    #[test]
    fn matches_type_any_accepts_everything() {
        let v = TypedValue::string("x");
        assert!(v.matches_type(DataType::Any));
        assert!(v.matches_type(DataType::String));
        assert!(!v.matches_type(DataType::Number));
    }
}
