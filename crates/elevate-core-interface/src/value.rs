//! Values carried across the host transport
//!
//! The host channel moves a method name plus a mapping-valued argument bundle.
//! `Value` covers the shapes the bridge needs; anything else is the transport's
//! problem.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A single value on the host channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    /// Short type name used in argument errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v.into_iter().map(Value::Str).collect())
    }
}

/// Why a required argument could not be read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("missing required argument '{0}'")]
    Missing(String),

    #[error("argument '{name}' must be {expected}, got {actual}")]
    WrongType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Named argument bundle of a method call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required string argument
    pub fn require_str(&self, name: &str) -> Result<&str, ArgumentError> {
        match self.require(name)? {
            Value::Str(s) => Ok(s),
            other => Err(wrong_type(name, "string", other)),
        }
    }

    /// Required byte-sequence argument
    pub fn require_bytes(&self, name: &str) -> Result<&[u8], ArgumentError> {
        match self.require(name)? {
            Value::Bytes(b) => Ok(b),
            other => Err(wrong_type(name, "bytes", other)),
        }
    }

    fn require(&self, name: &str) -> Result<&Value, ArgumentError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Err(ArgumentError::Missing(name.to_string())),
            Some(value) => Ok(value),
        }
    }
}

fn wrong_type(name: &str, expected: &'static str, actual: &Value) -> ArgumentError {
    ArgumentError::WrongType {
        name: name.to_string(),
        expected,
        actual: actual.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_str() {
        let args = Arguments::new().with("path", "/tmp/x");
        assert_eq!(args.require_str("path").unwrap(), "/tmp/x");
    }

    #[test]
    fn test_missing_and_null_are_both_missing() {
        let args = Arguments::new().with("path", Value::Null);
        assert_eq!(
            args.require_str("path"),
            Err(ArgumentError::Missing("path".to_string()))
        );
        assert_eq!(
            args.require_bytes("bytes"),
            Err(ArgumentError::Missing("bytes".to_string()))
        );
    }

    #[test]
    fn test_wrong_type() {
        let args = Arguments::new().with("bytes", "AB");
        let err = args.require_bytes("bytes").unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument 'bytes' must be bytes, got string"
        );
    }

    #[test]
    fn test_wire_shape() {
        let args = Arguments::new()
            .with("path", "/tmp/x")
            .with("bytes", b"AB".to_vec());
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"{"bytes":{"bytes":[65,66]},"path":{"str":"/tmp/x"}}"#);
    }

    #[test]
    fn test_string_list_conversion() {
        let v: Value = vec!["a".to_string(), "b".to_string()].into();
        assert_eq!(
            v,
            Value::List(vec![Value::Str("a".into()), Value::Str("b".into())])
        );
    }
}
