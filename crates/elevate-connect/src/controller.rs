//! Bridge controller: broker events, service binding and call dispatch
//!
//! The controller owns the single live handle to the remote file service and
//! drives it from broker events:
//!
//! ```text
//! binder received ──> ensure_bound ──(granted)──> bind ──> service connected
//! permission result (our code, granted) ──> ensure_bound
//! binder dead / service disconnected ──> handle cleared
//! ```
//!
//! All mutable state sits behind one mutex that is never held across a broker
//! call, a listener callback or an `.await`. Broker callbacks can therefore
//! arrive on any thread, including re-entrantly from inside `bind`.

use crate::broker::{
    BrokerApi, BrokerClient, BrokerListener, PermissionState, ServiceConnection, Subscription,
};
use crate::descriptor::ServiceDescriptor;
use crate::error::ConnectError;
use crate::ops::{BridgeMethod, FileMethod, FileOp};
use async_trait::async_trait;
use elevate_core_interface::{
    Arguments, FileService, MethodCall, MethodCallHandler, MethodError, MethodResult, Value,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Request code tagging this bridge's permission prompts
pub const DEFAULT_PERMISSION_REQUEST_CODE: i32 = 1001;

/// Coarse connection state derived from the controller's flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Broker binder not received
    Unavailable,
    /// Binder alive, permission missing
    PermissionNeeded,
    /// Granted, service handle not yet delivered
    Binding,
    Connected,
}

struct ConnectionHandle {
    service: Arc<dyn FileService>,
    connected_at: Instant,
}

struct PendingPermission {
    ticket: u64,
    resolve: oneshot::Sender<bool>,
}

#[derive(Default)]
struct Shared {
    binder_alive: bool,
    bind_in_flight: bool,
    connection: Option<ConnectionHandle>,
    pending_permission: Option<PendingPermission>,
    next_ticket: u64,
    subscription: Option<Subscription>,
    registered: bool,
    torn_down: bool,
}

struct Inner {
    broker: BrokerClient,
    descriptor: ServiceDescriptor,
    request_code: i32,
    sink: Arc<dyn ServiceConnection>,
    shared: Mutex<Shared>,
}

enum PermissionRequest {
    Resolved(bool),
    Pending(oneshot::Receiver<bool>),
}

/// Connects the host channel to the remote file service
///
/// Cheap to clone; clones drive the same connection.
///
/// # Example
///
/// ```no_run
/// use elevate_connect::{BridgeController, ComponentName, InProcessBroker, ServiceDescriptor};
/// use elevate_core_interface::MethodCall;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InProcessBroker::new();
/// let descriptor = ServiceDescriptor::new(ComponentName::new("com.example", "com.example.Files"));
/// let controller = BridgeController::new(broker.clone(), descriptor);
/// controller.register()?;
///
/// broker.start();
/// if controller.request_permission().await {
///     let reply = controller
///         .dispatch(MethodCall::new("exists").arg("path", "/sdcard"))
///         .await;
///     println!("{:?}", reply);
/// }
/// controller.unregister();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BridgeController {
    inner: Arc<Inner>,
}

impl BridgeController {
    pub fn new(broker: Arc<dyn BrokerApi>, descriptor: ServiceDescriptor) -> Self {
        Self::with_request_code(broker, descriptor, DEFAULT_PERMISSION_REQUEST_CODE)
    }

    pub fn with_request_code(
        broker: Arc<dyn BrokerApi>,
        descriptor: ServiceDescriptor,
        request_code: i32,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            broker: BrokerClient::new(broker),
            descriptor,
            request_code,
            sink: Arc::new(ConnectionSink(weak.clone())),
            shared: Mutex::new(Shared::default()),
        });
        Self { inner }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.inner.descriptor
    }

    pub fn request_code(&self) -> i32 {
        self.inner.request_code
    }

    /// Subscribe to broker events
    ///
    /// Idempotent. If the broker is already up, its sticky binder-received
    /// event triggers the first bind attempt before this returns.
    pub fn register(&self) -> Result<(), ConnectError> {
        {
            let mut shared = self.inner.shared.lock();
            if shared.torn_down {
                return Err(ConnectError::TornDown);
            }
            if shared.registered {
                return Ok(());
            }
            shared.registered = true;
        }

        let listener = Arc::new(ListenerAdapter(Arc::downgrade(&self.inner)));
        let subscription = match self.inner.broker.register(listener) {
            Ok(subscription) => subscription,
            Err(e) => {
                self.inner.shared.lock().registered = false;
                return Err(e);
            }
        };

        let stale = {
            let mut shared = self.inner.shared.lock();
            if shared.torn_down {
                Some(subscription)
            } else {
                shared.subscription = Some(subscription);
                None
            }
        };
        match stale {
            // Torn down while subscribing; dropping releases the listener
            Some(subscription) => drop(subscription),
            None => info!(tag = %self.inner.descriptor.tag(), "Bridge registered with broker"),
        }
        Ok(())
    }

    /// Release every broker resource
    ///
    /// Idempotent and infallible. Unsubscribes, force-unbinds the service,
    /// drops the handle and resolves an outstanding permission request with
    /// `false`.
    pub fn unregister(&self) {
        let (subscription, pending, had_connection) = {
            let mut shared = self.inner.shared.lock();
            if shared.torn_down {
                return;
            }
            shared.torn_down = true;
            shared.binder_alive = false;
            shared.bind_in_flight = false;
            (
                shared.subscription.take(),
                shared.pending_permission.take(),
                shared.connection.take().is_some(),
            )
        };

        drop(subscription);
        if pending.is_some() {
            debug!("Abandoning outstanding permission request");
        }
        drop(pending);

        self.inner
            .broker
            .unbind(&self.inner.descriptor, &self.inner.sink, true);
        info!(had_connection, "Bridge unregistered");
    }

    pub fn permission_state(&self) -> PermissionState {
        self.inner.broker.permission_state()
    }

    pub fn state(&self) -> BridgeState {
        let (alive, connected, binding) = {
            let shared = self.inner.shared.lock();
            (
                shared.binder_alive,
                shared.connection.is_some(),
                shared.bind_in_flight,
            )
        };

        if !alive {
            BridgeState::Unavailable
        } else if connected {
            BridgeState::Connected
        } else if binding || self.permission_state() == PermissionState::Granted {
            BridgeState::Binding
        } else {
            BridgeState::PermissionNeeded
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.shared.lock().connection.is_some()
    }

    /// Ask the broker for permission, resolving with the user's answer
    ///
    /// Resolves `false` at once if the broker is unreachable and `true` at
    /// once if permission is already held. Only one request is tracked: a new
    /// request supersedes an outstanding one, which then resolves `false`.
    pub async fn request_permission(&self) -> bool {
        match self.inner.begin_permission_request() {
            PermissionRequest::Resolved(granted) => granted,
            PermissionRequest::Pending(answer) => match answer.await {
                Ok(granted) => granted,
                Err(_) => {
                    warn!("Permission request superseded or bridge torn down before an answer");
                    false
                }
            },
        }
    }

    /// Ask the remote service to shut down its process
    ///
    /// Fire-and-forget. Returns `false` when there is no service to destroy.
    /// The handle is cleared when the broker reports the disconnect.
    pub fn destroy_service(&self) -> bool {
        match self.connected_service() {
            Some(service) => {
                info!(process = %self.inner.descriptor.process_name(), "Destroying file service");
                service.destroy();
                true
            }
            None => false,
        }
    }

    /// Resolve one method call from the host channel
    pub async fn dispatch(&self, call: MethodCall) -> MethodResult {
        let Some(method) = BridgeMethod::from_name(&call.method) else {
            debug!(method = %call.method, "Unknown method");
            return Err(MethodError::NotImplemented(call.method));
        };

        match method {
            BridgeMethod::GetState => Ok(Value::from(self.permission_state().as_str())),
            BridgeMethod::RequestPermission => Ok(Value::Bool(self.request_permission().await)),
            BridgeMethod::File(file_method) => self.dispatch_file(file_method, &call.args).await,
        }
    }

    async fn dispatch_file(&self, method: FileMethod, args: &Arguments) -> MethodResult {
        let Some(service) = self.connected_service() else {
            debug!(method = method.name(), "No file service connected");
            return Err(ConnectError::NotConnected.into());
        };

        let op = FileOp::decode(method, args)?;
        op.invoke(service.as_ref()).await.map_err(|e| {
            warn!(method = method.name(), error = %e, "Remote file call failed");
            ConnectError::Service(e).into()
        })
    }

    fn connected_service(&self) -> Option<Arc<dyn FileService>> {
        self.inner
            .shared
            .lock()
            .connection
            .as_ref()
            .map(|c| Arc::clone(&c.service))
    }
}

#[async_trait]
impl MethodCallHandler for BridgeController {
    async fn on_method_call(&self, call: MethodCall) -> MethodResult {
        self.dispatch(call).await
    }
}

impl Inner {
    fn on_binder_received(&self) {
        {
            let mut shared = self.shared.lock();
            if shared.torn_down {
                return;
            }
            shared.binder_alive = true;
        }
        info!("Broker binder received");
        self.ensure_bound();
    }

    fn on_binder_dead(&self) {
        let held_for = {
            let mut shared = self.shared.lock();
            shared.binder_alive = false;
            shared.bind_in_flight = false;
            shared.connection.take().map(|c| c.connected_at.elapsed())
        };
        warn!(?held_for, "Broker binder died");
    }

    fn on_permission_result(&self, request_code: i32, granted: bool) {
        if request_code != self.request_code {
            debug!(request_code, "Ignoring permission result for another request code");
            return;
        }

        info!(granted, "Permission result received");
        if granted {
            self.ensure_bound();
        }

        let pending = self.shared.lock().pending_permission.take();
        match pending {
            Some(pending) => {
                if pending.resolve.send(granted).is_err() {
                    debug!(ticket = pending.ticket, "Permission caller went away");
                }
            }
            None => debug!("No permission request waiting"),
        }
    }

    fn on_service_connected(&self, service: Arc<dyn FileService>) {
        let mut shared = self.shared.lock();
        shared.bind_in_flight = false;
        if shared.torn_down {
            debug!("Service connected after teardown, dropping handle");
            return;
        }
        if !shared.binder_alive {
            debug!("Service connected after binder death, dropping handle");
            return;
        }
        shared.connection = Some(ConnectionHandle {
            service,
            connected_at: Instant::now(),
        });
        info!(process = %self.descriptor.process_name(), "File service connected");
    }

    fn on_service_disconnected(&self) {
        let held_for = {
            let mut shared = self.shared.lock();
            shared.bind_in_flight = false;
            shared.connection.take().map(|c| c.connected_at.elapsed())
        };
        warn!(?held_for, "File service disconnected");
    }

    /// Bind if alive, granted, unbound and no bind is already in flight
    fn ensure_bound(&self) {
        {
            let mut shared = self.shared.lock();
            if shared.torn_down
                || !shared.binder_alive
                || shared.bind_in_flight
                || shared.connection.is_some()
            {
                return;
            }
            shared.bind_in_flight = true;
        }

        let outcome = match self.broker.permission_state() {
            PermissionState::Granted => {
                debug!(tag = %self.descriptor.tag(), "Binding file service");
                self.broker.bind(&self.descriptor, Arc::clone(&self.sink))
            }
            state => {
                debug!(%state, "Not binding without permission");
                Err(ConnectError::PermissionDenied)
            }
        };

        if let Err(e) = outcome {
            if !matches!(e, ConnectError::PermissionDenied) {
                warn!(error = %e, "Bind request failed");
            }
            self.shared.lock().bind_in_flight = false;
        }
    }

    fn begin_permission_request(&self) -> PermissionRequest {
        if !self.broker.ping_available() {
            debug!("Broker unreachable, permission request refused");
            return PermissionRequest::Resolved(false);
        }

        match self.broker.permission_state() {
            PermissionState::Granted => {
                self.ensure_bound();
                return PermissionRequest::Resolved(true);
            }
            PermissionState::NeedsPermission => {}
            state => {
                debug!(%state, "Broker not ready for a permission prompt");
                return PermissionRequest::Resolved(false);
            }
        }

        let (resolve, answer) = oneshot::channel();
        let ticket = {
            let mut shared = self.shared.lock();
            if shared.torn_down {
                return PermissionRequest::Resolved(false);
            }
            shared.next_ticket += 1;
            let ticket = shared.next_ticket;
            let superseded = shared
                .pending_permission
                .replace(PendingPermission { ticket, resolve });
            if let Some(previous) = superseded {
                warn!(previous = previous.ticket, "Superseding outstanding permission request");
            }
            ticket
        };

        if let Err(e) = self.broker.request_permission(self.request_code) {
            warn!(error = %e, "Permission prompt could not be shown");
            let mut shared = self.shared.lock();
            if shared
                .pending_permission
                .as_ref()
                .is_some_and(|p| p.ticket == ticket)
            {
                shared.pending_permission = None;
            }
            return PermissionRequest::Resolved(false);
        }

        debug!(ticket, request_code = self.request_code, "Permission prompt shown");
        PermissionRequest::Pending(answer)
    }
}

/// Broker listener forwarding to a live controller
struct ListenerAdapter(Weak<Inner>);

impl BrokerListener for ListenerAdapter {
    fn on_binder_received(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_binder_received();
        }
    }

    fn on_binder_dead(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_binder_dead();
        }
    }

    fn on_permission_result(&self, request_code: i32, granted: bool) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_permission_result(request_code, granted);
        }
    }
}

/// Service connection sink handed to `bind_user_service`
struct ConnectionSink(Weak<Inner>);

impl ServiceConnection for ConnectionSink {
    fn on_service_connected(&self, service: Arc<dyn FileService>) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_service_connected(service);
        }
    }

    fn on_service_disconnected(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_service_disconnected();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComponentName, InProcessBroker, PromptPolicy};
    use elevate_core_interface::ErrorCode;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new(ComponentName::new("com.test", "com.test.FileService")).daemon(false)
    }

    fn controller(broker: &Arc<InProcessBroker>) -> BridgeController {
        BridgeController::new(broker.clone(), descriptor())
    }

    #[test]
    fn test_sticky_binder_binds_when_granted() {
        let broker = InProcessBroker::new();
        broker.set_granted(true);
        broker.start();

        let ctl = controller(&broker);
        assert_eq!(ctl.state(), BridgeState::Unavailable);
        ctl.register().unwrap();

        assert!(ctl.is_connected());
        assert_eq!(ctl.state(), BridgeState::Connected);
        assert_eq!(broker.bind_requests(), 1);
    }

    #[test]
    fn test_no_bind_without_permission() {
        let broker = InProcessBroker::new();
        broker.start();

        let ctl = controller(&broker);
        ctl.register().unwrap();

        assert!(!ctl.is_connected());
        assert_eq!(ctl.state(), BridgeState::PermissionNeeded);
        assert_eq!(broker.bind_requests(), 0);
    }

    #[test]
    fn test_register_is_idempotent() {
        let broker = InProcessBroker::new();
        let ctl = controller(&broker);
        ctl.register().unwrap();
        ctl.register().unwrap();
        assert_eq!(broker.listener_count(), 1);
    }

    #[test]
    fn test_register_after_teardown_fails() {
        let broker = InProcessBroker::new();
        let ctl = controller(&broker);
        ctl.unregister();
        assert!(matches!(ctl.register(), Err(ConnectError::TornDown)));
    }

    #[test]
    fn test_foreign_request_code_ignored() {
        let broker = InProcessBroker::new();
        broker.start();
        let ctl = controller(&broker);
        ctl.register().unwrap();

        broker.set_granted(true);
        broker.send_permission_result(42, true);
        assert!(!ctl.is_connected());

        broker.send_permission_result(DEFAULT_PERMISSION_REQUEST_CODE, true);
        assert!(ctl.is_connected());
    }

    #[tokio::test]
    async fn test_permission_refused_when_broker_down() {
        let broker = InProcessBroker::new();
        let ctl = controller(&broker);
        ctl.register().unwrap();

        assert!(!ctl.request_permission().await);
        assert_eq!(broker.prompts_issued(), 0);
    }

    #[tokio::test]
    async fn test_auto_grant_binds_and_resolves() {
        let broker = InProcessBroker::new();
        broker.set_prompt_policy(PromptPolicy::AutoGrant);
        broker.start();
        let ctl = controller(&broker);
        ctl.register().unwrap();

        assert!(ctl.request_permission().await);
        assert!(ctl.is_connected());
        assert_eq!(broker.bind_requests(), 1);
    }

    #[tokio::test]
    async fn test_no_service_before_connect() {
        let broker = InProcessBroker::new();
        let ctl = controller(&broker);
        let err = ctl
            .dispatch(MethodCall::new("exists").arg("path", "/"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NoService));
    }

    #[tokio::test]
    async fn test_get_state_reports_wire_string() {
        let broker = InProcessBroker::new();
        let ctl = controller(&broker);
        let state = ctl.dispatch(MethodCall::new("getShizukuState")).await;
        assert_eq!(state, Ok(Value::from("not_running")));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let broker = InProcessBroker::new();
        broker.set_granted(true);
        broker.start();
        let ctl = controller(&broker);
        ctl.register().unwrap();

        ctl.unregister();
        ctl.unregister();
        assert!(!ctl.is_connected());
        assert_eq!(broker.listener_count(), 0);
        assert_eq!(broker.live_processes(), 0);
    }
}
