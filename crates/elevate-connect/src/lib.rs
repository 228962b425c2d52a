//! Elevate Connect: the client side of the privileged file bridge
//!
//! This crate talks to the capability broker on behalf of the host process. It
//! asks for permission, binds the privileged `FileService`, keeps exactly one
//! live handle to it and routes host method calls to it.
//!
//! # Modules
//!
//! - **broker**: the raw `BrokerApi`, its fail-closed `BrokerClient` wrapper
//!   and the listener/connection callback traits
//! - **controller**: `BridgeController`, the connection state machine and
//!   method dispatcher
//! - **descriptor**: `ServiceDescriptor`, the immutable bind arguments
//! - **ops**: method names and decoding of file operations
//! - **sim**: `InProcessBroker`, a broker living in the current process
//!
//! # Example
//!
//! ```no_run
//! use elevate_connect::{BridgeController, ComponentName, InProcessBroker, ServiceDescriptor};
//! use elevate_core_interface::MethodCall;
//!
//! # async fn demo() {
//! let broker = InProcessBroker::new();
//! broker.set_granted(true);
//! broker.start();
//!
//! let controller = BridgeController::new(
//!     broker.clone(),
//!     ServiceDescriptor::new(ComponentName::new("com.example", "com.example.Files")),
//! );
//! controller.register().unwrap();
//!
//! let listing = controller
//!     .dispatch(MethodCall::new("listFiles").arg("path", "/data"))
//!     .await;
//! # }
//! ```

pub mod broker;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod ops;
pub mod sim;

pub use broker::{
    BrokerApi, BrokerClient, BrokerListener, ListenerId, PermissionState, ServiceConnection,
    Subscription,
};
pub use controller::{BridgeController, BridgeState, DEFAULT_PERMISSION_REQUEST_CODE};
pub use descriptor::{ComponentName, ServiceDescriptor};
pub use error::ConnectError;
pub use ops::{BridgeMethod, FileMethod, FileOp};
pub use sim::{ConnectPolicy, InProcessBroker, PromptPolicy};
