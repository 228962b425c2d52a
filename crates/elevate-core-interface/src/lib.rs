//! Elevate Core Interface: the contracts shared by both sides of the bridge
//!
//! This crate defines the `FileService` trait, which is the interface exposed by
//! the privileged file service living in the broker-spawned process, and the
//! value model used by the host transport to carry method calls into the bridge.
//!
//! # Architecture
//!
//! ```text
//! UI layer ──MethodCall──> MethodCallHandler (bridge) ──FileService──> privileged process
//!          <─MethodResult─                            <────Result─────
//! ```
//!
//! The `FileService` operations are deliberately forgiving: a missing path is not
//! an error, it yields an empty listing, an empty read or a `-1` size. The only
//! errors that cross the trait are faults of the remote endpoint itself (a dead
//! process, a broken transport, a destroyed service).
//!
//! # Example
//!
//! ```rust,no_run
//! use elevate_core_interface::FileService;
//! use std::path::Path;
//!
//! async fn backup<S: FileService + ?Sized>(service: &S) -> elevate_core_interface::Result<bool> {
//!     let src = Path::new("/data/mission.kmz");
//!     if service.file_size(src).await? < 0 {
//!         return Ok(false);
//!     }
//!     let bytes = service.read_file(src).await?;
//!     service.write_file(Path::new("/data/backup/mission.kmz"), &bytes).await
//! }
//! ```

mod method;
mod value;

pub use method::{ErrorCode, MethodCall, MethodCallHandler, MethodError, MethodResult};
pub use value::{ArgumentError, Arguments, Value};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Faults raised by the remote endpoint rather than by the filesystem
#[derive(Error, Debug)]
pub enum FileServiceError {
    /// The process hosting the service is gone
    #[error("Remote service process is dead")]
    DeadObject,

    /// The service received `destroy()` and refuses further calls
    #[error("Remote service has been destroyed")]
    Destroyed,

    /// The transport failed mid-call
    #[error("Transport error: {0}")]
    Transport(String),

    /// An I/O failure the operation does not collapse into a status value
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FileServiceError>;

/// The privileged file service bound through the broker
///
/// Implementations live in the elevated process (`LocalFileService`) or proxy
/// to it. Every operation is independently idempotent and only touches the
/// filesystem.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync + 'static`; the bridge shares one handle
/// between concurrent dispatches.
#[async_trait]
pub trait FileService: Send + Sync + 'static {
    /// Names of the direct children of `path`
    ///
    /// Returns an empty list when `path` is missing or not a directory.
    async fn list_files(&self, path: &Path) -> Result<Vec<String>>;

    /// Full contents of the file at `path`
    ///
    /// Returns an empty buffer when `path` is missing or not a regular file.
    /// Callers that need to tell an empty file from a missing one use
    /// `exists` or `file_size`.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Replace the contents of `path`, creating parent directories as needed
    ///
    /// Any I/O failure is reported as `Ok(false)`.
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<bool>;

    /// Length of `path` in bytes, or `-1` when it does not exist
    async fn file_size(&self, path: &Path) -> Result<i64>;

    /// Whether `path` exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Delete `path`
    ///
    /// Returns `Ok(false)` when nothing was deleted, including when `path`
    /// does not exist or is a non-empty directory.
    async fn delete_file(&self, path: &Path) -> Result<bool>;

    /// One-way teardown signal
    ///
    /// The hosting process exits once it observes the signal. No response is
    /// produced and no ordering is guaranteed relative to in-flight calls.
    fn destroy(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FileServiceError::DeadObject.to_string(),
            "Remote service process is dead"
        );
        assert_eq!(
            FileServiceError::Transport("broken pipe".to_string()).to_string(),
            "Transport error: broken pipe"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err: FileServiceError = io.into();
        assert!(matches!(err, FileServiceError::Io(_)));
        assert!(err.to_string().contains("disk on fire"));
    }
}
