/*!
 * Error types for Elevate
 */

use elevate_connect::ConnectError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ElevateError>;

#[derive(Error, Debug)]
pub enum ElevateError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed message on the host transport
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Broker interaction failed
    #[error("Broker error: {0}")]
    Connect(#[from] ConnectError),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for ElevateError {
    fn from(err: toml::de::Error) -> Self {
        ElevateError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ElevateError {
    fn from(err: toml::ser::Error) -> Self {
        ElevateError::Config(err.to_string())
    }
}
