/*!
 * Host transport adapter: a named method channel with one handler slot
 */

use elevate_core_interface::{MethodCall, MethodCallHandler, MethodError, MethodResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Channel name the UI layer talks to
pub const DEFAULT_CHANNEL_NAME: &str = "com.example.dronestuff/shizuku";

/// Named request/response channel between the UI layer and the bridge
///
/// Holds at most one handler. Calls arriving while no handler is set
/// resolve to `NotImplemented`.
pub struct MethodChannel {
    name: String,
    handler: RwLock<Option<Arc<dyn MethodCallHandler>>>,
}

impl MethodChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install or clear the handler; replaces any previous one
    pub fn set_method_call_handler(&self, handler: Option<Arc<dyn MethodCallHandler>>) {
        *self.handler.write() = handler;
    }

    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    pub async fn invoke(&self, call: MethodCall) -> MethodResult {
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler.on_method_call(call).await,
            None => {
                debug!(channel = %self.name, method = %call.method, "No handler on channel");
                Err(MethodError::NotImplemented(call.method))
            }
        }
    }
}

impl Default for MethodChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_NAME)
    }
}
