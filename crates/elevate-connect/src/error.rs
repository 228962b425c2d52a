//! Error types for the elevate-connect crate

use elevate_core_interface::{FileServiceError, MethodError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Broker is not installed")]
    NotInstalled,

    #[error("Broker binder is not alive")]
    BinderNotAlive,

    #[error("Broker permission not granted")]
    PermissionDenied,

    #[error("Broker call failed: {0}")]
    Broker(String),

    #[error("Remote file service not connected")]
    NotConnected,

    #[error("Bridge has been torn down")]
    TornDown,

    #[error("Remote call failed: {0}")]
    Service(#[from] FileServiceError),
}

impl From<ConnectError> for MethodError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::NotConnected => MethodError::no_service(),
            ConnectError::Service(e) => MethodError::service_error(e.to_string()),
            other => MethodError::service_error(other.to_string()),
        }
    }
}
