//! Read-only run parameters.
//!
//! Parameters are a string-keyed tree. Top-level keys hold run-wide values;
//! each pipeline slot owns a sub-namespace under its own key, so stage
//! settings are read with [`Params::get_in`].

use serde_json::{Map, Value};

use crate::{Delta, ParamsError};

/// Parameter handle shared by every stage of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Map<String, Value>,
}

impl Params {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a parsed document. `null` is treated as an empty document.
    pub fn from_value(value: Value) -> Result<Self, ParamsError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::new()),
            _ => Err(ParamsError::NotAMapping),
        }
    }

    /// Set a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder method to set a value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Look up a top-level value. Explicit `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// Returns true if a non-null value is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sub-namespace owned by a slot, if configured as a mapping.
    pub fn namespace(&self, namespace: &str) -> Option<&Map<String, Value>> {
        self.get(namespace).and_then(Value::as_object)
    }

    /// Look up a value inside a sub-namespace.
    pub fn get_in(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.namespace(namespace)
            .and_then(|ns| ns.get(key))
            .filter(|v| !v.is_null())
    }

    /// Scalar value rendered as text (numbers and booleans included).
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(as_text)
    }

    /// Scalar value inside a sub-namespace rendered as text.
    pub fn text_in(&self, namespace: &str, key: &str) -> Option<String> {
        self.get_in(namespace, key).and_then(as_text)
    }

    /// String value, or an error naming the key.
    pub fn require_text(&self, key: &str) -> Result<String, ParamsError> {
        self.text(key)
            .ok_or_else(|| ParamsError::Missing(key.to_string()))
    }

    /// Unsigned integer value; numeric strings are accepted.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ParamsError> {
        self.get(key).map(|v| as_u64(key, v)).transpose()
    }

    /// Boolean value; `"true"`/`"false"` strings are accepted.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ParamsError> {
        self.get(key).map(|v| as_bool(key, v)).transpose()
    }

    /// List value given as a sequence or a comma separated string.
    /// Missing keys yield an empty list.
    pub fn list(&self, key: &str) -> Result<Vec<String>, ParamsError> {
        self.get(key).map_or(Ok(Vec::new()), |v| as_list(key, v))
    }

    /// List value inside a sub-namespace.
    pub fn list_in(&self, namespace: &str, key: &str) -> Result<Vec<String>, ParamsError> {
        self.get_in(namespace, key)
            .map_or(Ok(Vec::new()), |v| as_list(key, v))
    }

    /// Grid delta in arc-minutes, e.g. `delta: 30` or `delta: "30,30"`.
    pub fn delta(&self, key: &str) -> Result<Delta, ParamsError> {
        let text = self.require_text(key)?;
        Ok(Delta::parse_arcminutes(&text)?)
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_u64(key: &str, value: &Value) -> Result<u64, ParamsError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ParamsError::WrongType {
        key: key.to_string(),
        expected: "a non-negative integer",
    })
}

fn as_bool(key: &str, value: &Value) -> Result<bool, ParamsError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(ParamsError::WrongType {
            key: key.to_string(),
            expected: "a boolean",
        }),
    }
}

fn as_list(key: &str, value: &Value) -> Result<Vec<String>, ParamsError> {
    let wrong = || ParamsError::WrongType {
        key: key.to_string(),
        expected: "a list or comma separated string",
    };
    match value {
        Value::Array(items) => items.iter().map(|v| as_text(v).ok_or_else(wrong)).collect(),
        other => {
            let text = as_text(other).ok_or_else(wrong)?;
            Ok(text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect())
        }
    }
}
