//! Method calls and their results on the host channel

use crate::value::{ArgumentError, Arguments, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A named call with its argument bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub args: Arguments,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Arguments::new(),
        }
    }

    pub fn with_args(method: impl Into<String>, args: Arguments) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    /// Builder-style argument
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name, value);
        self
    }
}

/// Tagged error codes reported to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No live connection to the remote service
    NoService,
    /// The remote call raised
    ServiceError,
    /// A required argument was missing or had the wrong type
    InvalidArgument,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoService => "NO_SERVICE",
            ErrorCode::ServiceError => "SERVICE_ERROR",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error side of a method call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MethodError {
    /// No handler knows this method
    #[error("method '{0}' is not implemented")]
    NotImplemented(String),

    #[error("{code}: {message}")]
    Failed { code: ErrorCode, message: String },
}

impl MethodError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        MethodError::Failed {
            code,
            message: message.into(),
        }
    }

    pub fn no_service() -> Self {
        Self::new(ErrorCode::NoService, "Remote file service not connected")
    }

    pub fn service_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceError, message)
    }

    /// The tagged code, if this is not a `NotImplemented`
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            MethodError::NotImplemented(_) => None,
            MethodError::Failed { code, .. } => Some(*code),
        }
    }
}

impl From<ArgumentError> for MethodError {
    fn from(err: ArgumentError) -> Self {
        MethodError::new(ErrorCode::InvalidArgument, err.to_string())
    }
}

pub type MethodResult = std::result::Result<Value, MethodError>;

/// Receiver of calls arriving on a host channel
///
/// A channel holds at most one handler; the handler resolves every call to a
/// value or a tagged error and never panics across the boundary.
#[async_trait]
pub trait MethodCallHandler: Send + Sync + 'static {
    async fn on_method_call(&self, call: MethodCall) -> MethodResult;
}
