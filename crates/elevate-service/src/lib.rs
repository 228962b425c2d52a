//! Elevate Service: the privileged side of the bridge
//!
//! This crate holds the file service that the broker spawns in its elevated
//! process and hands to the bridge through a service connection.
//!
//! - **LocalFileService**: `FileService` over the local filesystem
//! - **ServiceLifecycle**: Starting → Serving → Destroyed state machine
//! - **DestroyWatch**: the process host's view of the one-way destroy signal

pub mod lifecycle;
mod local;

pub use lifecycle::{LifecycleEvent, LifecycleState, ServiceLifecycle};
pub use local::{DestroyWatch, LocalFileService};
