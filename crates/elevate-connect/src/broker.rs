//! Broker access: the raw capability API and a fail-closed client over it
//!
//! `BrokerApi` is the surface of the external capability broker. Every call on
//! it may fail if the broker is missing or its binder has died. `BrokerClient`
//! folds those failures into conservative answers so the controller never has
//! to reason about them.

use crate::descriptor::ServiceDescriptor;
use crate::error::ConnectError;
use elevate_core_interface::FileService;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Handle returned by `BrokerApi::add_listener`
pub type ListenerId = u64;

/// Broker availability as seen by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Installed but its binder is not reachable
    NotRunning,
    /// Reachable, permission not yet granted
    #[serde(rename = "permission_needed")]
    NeedsPermission,
    /// Reachable and granted
    #[serde(rename = "ready")]
    Granted,
    /// Absent, or any query against it failed
    NotInstalled,
}

impl PermissionState {
    /// The wire string reported by `getShizukuState`
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::NotRunning => "not_running",
            PermissionState::NeedsPermission => "permission_needed",
            PermissionState::Granted => "ready",
            PermissionState::NotInstalled => "not_installed",
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker lifecycle and permission events
///
/// Callbacks may arrive on any thread, including synchronously from inside a
/// `BrokerApi` call.
pub trait BrokerListener: Send + Sync {
    fn on_binder_received(&self);
    fn on_binder_dead(&self);
    fn on_permission_result(&self, request_code: i32, granted: bool);
}

/// Receives the outcome of `bind_user_service`
pub trait ServiceConnection: Send + Sync {
    fn on_service_connected(&self, service: Arc<dyn FileService>);
    fn on_service_disconnected(&self);
}

/// The capability broker's client API
pub trait BrokerApi: Send + Sync {
    /// Whether the broker's binder is alive
    fn ping_binder(&self) -> Result<bool, ConnectError>;

    fn check_self_permission(&self) -> Result<bool, ConnectError>;

    /// Show the permission prompt; the answer arrives via
    /// `BrokerListener::on_permission_result` tagged with `request_code`
    fn request_permission(&self, request_code: i32) -> Result<(), ConnectError>;

    fn bind_user_service(
        &self,
        descriptor: &ServiceDescriptor,
        connection: Arc<dyn ServiceConnection>,
    ) -> Result<(), ConnectError>;

    /// `remove` also terminates the service process
    fn unbind_user_service(
        &self,
        descriptor: &ServiceDescriptor,
        connection: &Arc<dyn ServiceConnection>,
        remove: bool,
    ) -> Result<(), ConnectError>;

    /// Sticky: if the binder is already alive, `on_binder_received` is
    /// delivered immediately
    fn add_listener(&self, listener: Arc<dyn BrokerListener>) -> Result<ListenerId, ConnectError>;

    fn remove_listener(&self, id: ListenerId) -> Result<(), ConnectError>;
}

/// Fail-closed view of the broker
///
/// Cheap to clone; clones share the underlying API handle.
#[derive(Clone)]
pub struct BrokerClient {
    api: Arc<dyn BrokerApi>,
}

impl BrokerClient {
    pub fn new(api: Arc<dyn BrokerApi>) -> Self {
        Self { api }
    }

    /// `false` on any failure
    pub fn ping_available(&self) -> bool {
        match self.api.ping_binder() {
            Ok(alive) => alive,
            Err(e) => {
                debug!(error = %e, "Broker ping failed");
                false
            }
        }
    }

    /// Current availability, collapsing every query failure to `NotInstalled`
    pub fn permission_state(&self) -> PermissionState {
        match self.api.ping_binder() {
            Ok(true) => {}
            Ok(false) => return PermissionState::NotRunning,
            Err(e) => {
                debug!(error = %e, "Broker ping failed, treating as not installed");
                return PermissionState::NotInstalled;
            }
        }

        match self.api.check_self_permission() {
            Ok(true) => PermissionState::Granted,
            Ok(false) => PermissionState::NeedsPermission,
            Err(e) => {
                debug!(error = %e, "Permission check failed, treating as not installed");
                PermissionState::NotInstalled
            }
        }
    }

    pub fn request_permission(&self, request_code: i32) -> Result<(), ConnectError> {
        self.api.request_permission(request_code)
    }

    pub fn bind(
        &self,
        descriptor: &ServiceDescriptor,
        connection: Arc<dyn ServiceConnection>,
    ) -> Result<(), ConnectError> {
        self.api.bind_user_service(descriptor, connection)
    }

    /// Best-effort; errors are logged and dropped
    pub fn unbind(
        &self,
        descriptor: &ServiceDescriptor,
        connection: &Arc<dyn ServiceConnection>,
        remove: bool,
    ) {
        if let Err(e) = self.api.unbind_user_service(descriptor, connection, remove) {
            debug!(error = %e, tag = %descriptor.tag(), "Unbind failed, ignoring");
        }
    }

    /// Subscribe `listener`; the returned guard unsubscribes on drop
    pub fn register(&self, listener: Arc<dyn BrokerListener>) -> Result<Subscription, ConnectError> {
        let id = self.api.add_listener(listener)?;
        Ok(Subscription {
            api: Arc::clone(&self.api),
            id,
            active: true,
        })
    }
}

/// Active listener registration
///
/// Removal never fails from the caller's point of view.
pub struct Subscription {
    api: Arc<dyn BrokerApi>,
    id: ListenerId,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = self.api.remove_listener(self.id) {
            debug!(listener = self.id, error = %e, "Listener removal failed, ignoring");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Scripted broker answering from fixed results
    struct Scripted {
        ping: Result<bool, ()>,
        granted: Result<bool, ()>,
        removed: Mutex<Vec<ListenerId>>,
        fail_remove: bool,
    }

    impl Scripted {
        fn new(ping: Result<bool, ()>, granted: Result<bool, ()>) -> Self {
            Self {
                ping,
                granted,
                removed: Mutex::new(Vec::new()),
                fail_remove: false,
            }
        }
    }

    fn broker_err() -> ConnectError {
        ConnectError::Broker("scripted failure".to_string())
    }

    impl BrokerApi for Scripted {
        fn ping_binder(&self) -> Result<bool, ConnectError> {
            self.ping.map_err(|_| broker_err())
        }

        fn check_self_permission(&self) -> Result<bool, ConnectError> {
            self.granted.map_err(|_| broker_err())
        }

        fn request_permission(&self, _request_code: i32) -> Result<(), ConnectError> {
            Ok(())
        }

        fn bind_user_service(
            &self,
            _descriptor: &ServiceDescriptor,
            _connection: Arc<dyn ServiceConnection>,
        ) -> Result<(), ConnectError> {
            Ok(())
        }

        fn unbind_user_service(
            &self,
            _descriptor: &ServiceDescriptor,
            _connection: &Arc<dyn ServiceConnection>,
            _remove: bool,
        ) -> Result<(), ConnectError> {
            Err(broker_err())
        }

        fn add_listener(&self, _listener: Arc<dyn BrokerListener>) -> Result<ListenerId, ConnectError> {
            Ok(7)
        }

        fn remove_listener(&self, id: ListenerId) -> Result<(), ConnectError> {
            self.removed.lock().push(id);
            if self.fail_remove {
                Err(broker_err())
            } else {
                Ok(())
            }
        }
    }

    struct Quiet;

    impl BrokerListener for Quiet {
        fn on_binder_received(&self) {}
        fn on_binder_dead(&self) {}
        fn on_permission_result(&self, _request_code: i32, _granted: bool) {}
    }

    fn client(api: Scripted) -> (BrokerClient, Arc<Scripted>) {
        let api = Arc::new(api);
        (BrokerClient::new(api.clone()), api)
    }

    #[test]
    fn test_permission_state_table() {
        let cases = [
            (Err(()), Ok(true), PermissionState::NotInstalled),
            (Ok(false), Ok(true), PermissionState::NotRunning),
            (Ok(true), Err(()), PermissionState::NotInstalled),
            (Ok(true), Ok(true), PermissionState::Granted),
            (Ok(true), Ok(false), PermissionState::NeedsPermission),
        ];

        for (ping, granted, expected) in cases {
            let (client, _) = client(Scripted::new(ping, granted));
            assert_eq!(client.permission_state(), expected);
        }
    }

    #[test]
    fn test_ping_available_fails_closed() {
        let (client, _) = client(Scripted::new(Err(()), Ok(true)));
        assert!(!client.ping_available());
    }

    #[test]
    fn test_state_wire_strings() {
        assert_eq!(PermissionState::Granted.as_str(), "ready");
        assert_eq!(PermissionState::NeedsPermission.to_string(), "permission_needed");
        assert_eq!(
            serde_json::to_string(&PermissionState::Granted).unwrap(),
            "\"ready\""
        );
    }

    #[test]
    fn test_subscription_removes_once() {
        let (client, api) = client(Scripted::new(Ok(true), Ok(true)));
        let sub = client.register(Arc::new(Quiet)).unwrap();
        assert_eq!(sub.id(), 7);

        sub.unregister();
        assert_eq!(*api.removed.lock(), vec![7]);
    }

    #[test]
    fn test_subscription_drop_swallows_errors() {
        let mut scripted = Scripted::new(Ok(true), Ok(true));
        scripted.fail_remove = true;
        let (client, api) = client(scripted);

        drop(client.register(Arc::new(Quiet)).unwrap());
        assert_eq!(api.removed.lock().len(), 1);
    }

    #[test]
    fn test_unbind_swallows_errors() {
        struct NoopConnection;
        impl ServiceConnection for NoopConnection {
            fn on_service_connected(&self, _service: Arc<dyn FileService>) {}
            fn on_service_disconnected(&self) {}
        }

        let (client, _) = client(Scripted::new(Ok(true), Ok(true)));
        let descriptor = ServiceDescriptor::new(crate::ComponentName::new("a", "a.B"));
        let connection: Arc<dyn ServiceConnection> = Arc::new(NoopConnection);
        client.unbind(&descriptor, &connection, true);
    }
}
