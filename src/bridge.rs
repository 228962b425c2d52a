/*!
 * Attaching a BridgeController to a method channel for one host session
 */

use elevate_connect::{BridgeController, BrokerApi};
use std::sync::Arc;
use tracing::info;

use crate::channel::MethodChannel;
use crate::config::BridgeConfig;
use crate::error::Result;

/// Live bridge on a channel; detaches when dropped
///
/// Detaching clears the channel handler, unsubscribes from the broker and
/// force-unbinds the remote service.
pub struct BridgeRegistration {
    channel: Arc<MethodChannel>,
    controller: BridgeController,
    detached: bool,
}

impl BridgeRegistration {
    /// Install a new controller as the channel's handler and subscribe it
    pub fn attach(
        channel: Arc<MethodChannel>,
        broker: Arc<dyn BrokerApi>,
        config: &BridgeConfig,
    ) -> Result<Self> {
        let controller = BridgeController::with_request_code(
            broker,
            config.service.descriptor(),
            config.permission_request_code,
        );

        channel.set_method_call_handler(Some(Arc::new(controller.clone())));
        if let Err(e) = controller.register() {
            channel.set_method_call_handler(None);
            controller.unregister();
            return Err(e.into());
        }

        info!(
            channel = channel.name(),
            process = %controller.descriptor().process_name(),
            "Bridge attached"
        );
        Ok(Self {
            channel,
            controller,
            detached: false,
        })
    }

    pub fn controller(&self) -> &BridgeController {
        &self.controller
    }

    pub fn channel(&self) -> &Arc<MethodChannel> {
        &self.channel
    }

    pub fn detach(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.channel.set_method_call_handler(None);
        self.controller.unregister();
        info!(channel = self.channel.name(), "Bridge detached");
    }
}

impl Drop for BridgeRegistration {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elevate_connect::InProcessBroker;
    use elevate_core_interface::{MethodCall, MethodError, Value};

    #[tokio::test]
    async fn test_attach_then_drop() {
        let broker = InProcessBroker::new();
        broker.set_granted(true);
        broker.start();
        let channel = Arc::new(MethodChannel::default());

        {
            let registration =
                BridgeRegistration::attach(channel.clone(), broker.clone(), &BridgeConfig::default())
                    .unwrap();
            assert!(registration.controller().is_connected());
            assert_eq!(
                channel.invoke(MethodCall::new("getShizukuState")).await,
                Ok(Value::from("ready"))
            );
        }

        assert!(!channel.has_handler());
        assert_eq!(broker.listener_count(), 0);
        assert_eq!(broker.live_processes(), 0);
        assert_eq!(
            channel.invoke(MethodCall::new("getShizukuState")).await,
            Err(MethodError::NotImplemented("getShizukuState".into()))
        );
    }
}
