/*!
 * Elevate - privileged file access through a capability broker
 *
 * Bridges an application process to a file service running in a separate,
 * elevated process that a capability broker spawns and binds on request:
 * - Permission requests resolved from broker prompt results
 * - Binding and rebinding across broker restarts and service process death
 * - Fail-fast dispatch of file operations with tagged errors
 * - A named method channel for the UI layer, with a JSON-lines codec
 *
 * The broker-facing machinery lives in `elevate-connect`; the elevated side
 * in `elevate-service`.
 */

pub mod bridge;
pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;

// Re-export commonly used types
pub use bridge::BridgeRegistration;
pub use channel::{MethodChannel, DEFAULT_CHANNEL_NAME};
pub use config::{BridgeConfig, LogLevel, ServiceConfig};
pub use error::{ElevateError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
