//! In-process capability broker
//!
//! Stands in for the external broker on hosts that have none, and in tests.
//! Bound services are `LocalFileService` instances running in a simulated
//! process; the knobs on `InProcessBroker` drive the broker-side events
//! (binder up and down, prompt answers, deferred connects, process death).
//!
//! Listener and connection callbacks are always invoked with the broker's own
//! lock released.

use crate::broker::{BrokerApi, BrokerListener, ListenerId, ServiceConnection};
use crate::descriptor::ServiceDescriptor;
use crate::error::ConnectError;
use async_trait::async_trait;
use elevate_core_interface::{FileService, FileServiceError, Result as ServiceResult};
use elevate_service::LocalFileService;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// How the broker answers `request_permission`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptPolicy {
    /// Queue the prompt until `answer_prompt`
    #[default]
    Manual,
    AutoGrant,
    AutoDeny,
}

/// When a bind delivers `on_service_connected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectPolicy {
    /// From inside `bind_user_service`
    #[default]
    Immediate,
    /// On `complete_pending_binds`
    Deferred,
}

struct SimProcess {
    name: String,
    service: LocalFileService,
    alive: AtomicBool,
}

impl SimProcess {
    fn spawn(descriptor: &ServiceDescriptor) -> Arc<Self> {
        let name = descriptor.process_name();
        Arc::new(Self {
            service: LocalFileService::new(&name),
            name,
            alive: AtomicBool::new(true),
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// `true` if this call ended the process
    fn exit(&self) -> bool {
        let was_alive = self.alive.swap(false, Ordering::SeqCst);
        if was_alive {
            debug!(process = %self.name, "Simulated service process exited");
        }
        was_alive
    }
}

struct Binding {
    descriptor: ServiceDescriptor,
    connection: Arc<dyn ServiceConnection>,
    process: Arc<SimProcess>,
    delivered: bool,
}

impl Binding {
    fn proxy(&self) -> Arc<dyn FileService> {
        self.process.service.mark_serving();
        Arc::new(ServiceProxy {
            process: Arc::clone(&self.process),
            connection: Arc::clone(&self.connection),
        })
    }
}

struct SimState {
    installed: bool,
    running: bool,
    granted: bool,
    prompt_policy: PromptPolicy,
    connect_policy: ConnectPolicy,
    outstanding_prompts: VecDeque<i32>,
    prompts_issued: usize,
    bind_requests: usize,
    listeners: BTreeMap<ListenerId, Arc<dyn BrokerListener>>,
    next_listener: ListenerId,
    bindings: Vec<Binding>,
}

impl SimState {
    fn ensure_running(&self) -> Result<(), ConnectError> {
        if !self.installed {
            Err(ConnectError::NotInstalled)
        } else if !self.running {
            Err(ConnectError::BinderNotAlive)
        } else {
            Ok(())
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn BrokerListener>> {
        self.listeners.values().cloned().collect()
    }
}

/// Broker implementation living in the current process
pub struct InProcessBroker {
    state: Mutex<SimState>,
}

impl InProcessBroker {
    /// Installed, not yet running, permission not granted
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SimState {
                installed: true,
                running: false,
                granted: false,
                prompt_policy: PromptPolicy::default(),
                connect_policy: ConnectPolicy::default(),
                outstanding_prompts: VecDeque::new(),
                prompts_issued: 0,
                bind_requests: 0,
                listeners: BTreeMap::new(),
                next_listener: 0,
                bindings: Vec::new(),
            }),
        })
    }

    /// A broker whose every query fails
    pub fn not_installed() -> Arc<Self> {
        let broker = Self::new();
        broker.state.lock().installed = false;
        broker
    }

    /// Bring the binder up and notify listeners
    pub fn start(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if !state.installed || state.running {
                return;
            }
            state.running = true;
            state.listeners()
        };
        info!("Simulated broker started");
        for listener in listeners {
            listener.on_binder_received();
        }
    }

    /// Kill the binder: prompts vanish and every service process dies
    ///
    /// Connections get no disconnect callback; listeners get
    /// `on_binder_dead`.
    pub fn kill(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.outstanding_prompts.clear();
            for binding in state.bindings.drain(..) {
                binding.process.exit();
            }
            state.listeners()
        };
        info!("Simulated broker killed");
        for listener in listeners {
            listener.on_binder_dead();
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.state.lock().granted = granted;
    }

    pub fn set_prompt_policy(&self, policy: PromptPolicy) {
        self.state.lock().prompt_policy = policy;
    }

    pub fn set_connect_policy(&self, policy: ConnectPolicy) {
        self.state.lock().connect_policy = policy;
    }

    /// Answer the oldest queued prompt; `false` if none was queued
    pub fn answer_prompt(&self, granted: bool) -> bool {
        let (request_code, listeners) = {
            let mut state = self.state.lock();
            let Some(request_code) = state.outstanding_prompts.pop_front() else {
                return false;
            };
            if granted {
                state.granted = true;
            }
            (request_code, state.listeners())
        };
        for listener in listeners {
            listener.on_permission_result(request_code, granted);
        }
        true
    }

    /// Deliver a raw permission result without touching the grant
    pub fn send_permission_result(&self, request_code: i32, granted: bool) {
        let listeners = self.state.lock().listeners();
        for listener in listeners {
            listener.on_permission_result(request_code, granted);
        }
    }

    /// Deliver `on_service_connected` for deferred binds; returns how many
    pub fn complete_pending_binds(&self) -> usize {
        let ready: Vec<_> = {
            let mut state = self.state.lock();
            state
                .bindings
                .iter_mut()
                .filter(|b| !b.delivered && b.process.is_alive())
                .map(|b| {
                    b.delivered = true;
                    (Arc::clone(&b.connection), b.proxy())
                })
                .collect()
        };
        let count = ready.len();
        for (connection, proxy) in ready {
            connection.on_service_connected(proxy);
        }
        count
    }

    /// Crash every service process and report the disconnects
    pub fn disconnect_services(&self) -> usize {
        let gone: Vec<_> = {
            let mut state = self.state.lock();
            state
                .bindings
                .drain(..)
                .filter(|b| b.process.exit())
                .map(|b| b.connection)
                .collect()
        };
        let count = gone.len();
        for connection in gone {
            connection.on_service_disconnected();
        }
        count
    }

    /// Kill service processes without any callback
    ///
    /// Handles held by clients keep pointing at dead processes, so their
    /// next call fails with `DeadObject`.
    pub fn sever_service_transport(&self) {
        let state = self.state.lock();
        for binding in &state.bindings {
            binding.process.exit();
        }
    }

    pub fn prompts_issued(&self) -> usize {
        self.state.lock().prompts_issued
    }

    pub fn outstanding_prompts(&self) -> usize {
        self.state.lock().outstanding_prompts.len()
    }

    pub fn bind_requests(&self) -> usize {
        self.state.lock().bind_requests
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn live_processes(&self) -> usize {
        self.state
            .lock()
            .bindings
            .iter()
            .filter(|b| b.process.is_alive())
            .count()
    }

    /// Calls served across all live service processes
    pub fn calls_served(&self) -> u64 {
        self.state
            .lock()
            .bindings
            .iter()
            .map(|b| b.process.service.calls_served())
            .sum()
    }
}

fn same_connection(a: &Arc<dyn ServiceConnection>, b: &Arc<dyn ServiceConnection>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl BrokerApi for InProcessBroker {
    fn ping_binder(&self) -> Result<bool, ConnectError> {
        let state = self.state.lock();
        if !state.installed {
            return Err(ConnectError::NotInstalled);
        }
        Ok(state.running)
    }

    fn check_self_permission(&self) -> Result<bool, ConnectError> {
        let state = self.state.lock();
        state.ensure_running()?;
        Ok(state.granted)
    }

    fn request_permission(&self, request_code: i32) -> Result<(), ConnectError> {
        let answered = {
            let mut state = self.state.lock();
            state.ensure_running()?;
            state.prompts_issued += 1;
            match state.prompt_policy {
                PromptPolicy::Manual => {
                    state.outstanding_prompts.push_back(request_code);
                    None
                }
                PromptPolicy::AutoGrant => {
                    state.granted = true;
                    Some((true, state.listeners()))
                }
                PromptPolicy::AutoDeny => Some((false, state.listeners())),
            }
        };

        if let Some((granted, listeners)) = answered {
            for listener in listeners {
                listener.on_permission_result(request_code, granted);
            }
        }
        Ok(())
    }

    fn bind_user_service(
        &self,
        descriptor: &ServiceDescriptor,
        connection: Arc<dyn ServiceConnection>,
    ) -> Result<(), ConnectError> {
        let (stale, deliver) = {
            let mut state = self.state.lock();
            state.ensure_running()?;
            if !state.granted {
                return Err(ConnectError::PermissionDenied);
            }
            state.bind_requests += 1;

            // A process started for another version of the service is retired
            let tag = descriptor.tag();
            let mut stale = Vec::new();
            state.bindings.retain(|b| {
                let outdated = b.descriptor.tag() == tag && b.descriptor != *descriptor;
                if outdated && b.process.exit() {
                    stale.push(Arc::clone(&b.connection));
                }
                !outdated
            });

            let immediate = state.connect_policy == ConnectPolicy::Immediate;
            let existing = state
                .bindings
                .iter()
                .position(|b| b.descriptor == *descriptor && b.process.is_alive());
            let index = match existing {
                Some(index) => {
                    let binding = &mut state.bindings[index];
                    binding.connection = connection;
                    binding.delivered = false;
                    index
                }
                None => {
                    state.bindings.push(Binding {
                        descriptor: descriptor.clone(),
                        connection,
                        process: SimProcess::spawn(descriptor),
                        delivered: false,
                    });
                    state.bindings.len() - 1
                }
            };

            let deliver = if immediate {
                let binding = &mut state.bindings[index];
                binding.delivered = true;
                Some((Arc::clone(&binding.connection), binding.proxy()))
            } else {
                None
            };
            (stale, deliver)
        };

        for connection in stale {
            connection.on_service_disconnected();
        }
        if let Some((connection, proxy)) = deliver {
            connection.on_service_connected(proxy);
        }
        Ok(())
    }

    fn unbind_user_service(
        &self,
        descriptor: &ServiceDescriptor,
        connection: &Arc<dyn ServiceConnection>,
        remove: bool,
    ) -> Result<(), ConnectError> {
        let mut state = self.state.lock();
        state.ensure_running()?;

        let tag = descriptor.tag();
        state.bindings.retain(|b| {
            let matches = b.descriptor.tag() == tag && same_connection(&b.connection, connection);
            if matches && (remove || !b.descriptor.is_daemon()) {
                b.process.exit();
            }
            !matches || b.process.is_alive()
        });
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn BrokerListener>) -> Result<ListenerId, ConnectError> {
        let (id, sticky) = {
            let mut state = self.state.lock();
            state.next_listener += 1;
            let id = state.next_listener;
            state.listeners.insert(id, Arc::clone(&listener));
            (id, state.installed && state.running)
        };
        if sticky {
            listener.on_binder_received();
        }
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> Result<(), ConnectError> {
        self.state.lock().listeners.remove(&id);
        Ok(())
    }
}

/// Client-side handle onto a simulated service process
struct ServiceProxy {
    process: Arc<SimProcess>,
    connection: Arc<dyn ServiceConnection>,
}

impl ServiceProxy {
    fn live(&self) -> ServiceResult<&LocalFileService> {
        if self.process.is_alive() {
            Ok(&self.process.service)
        } else {
            Err(FileServiceError::DeadObject)
        }
    }
}

#[async_trait]
impl FileService for ServiceProxy {
    async fn list_files(&self, path: &Path) -> ServiceResult<Vec<String>> {
        self.live()?.list_files(path).await
    }

    async fn read_file(&self, path: &Path) -> ServiceResult<Vec<u8>> {
        self.live()?.read_file(path).await
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> ServiceResult<bool> {
        self.live()?.write_file(path, data).await
    }

    async fn file_size(&self, path: &Path) -> ServiceResult<i64> {
        self.live()?.file_size(path).await
    }

    async fn exists(&self, path: &Path) -> ServiceResult<bool> {
        self.live()?.exists(path).await
    }

    async fn delete_file(&self, path: &Path) -> ServiceResult<bool> {
        self.live()?.delete_file(path).await
    }

    /// The process exits once the service is destroyed
    fn destroy(&self) {
        self.process.service.destroy();
        if self.process.exit() {
            self.connection.on_service_disconnected();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComponentName;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl BrokerListener for Recorder {
        fn on_binder_received(&self) {
            self.events.lock().push("received".into());
        }
        fn on_binder_dead(&self) {
            self.events.lock().push("dead".into());
        }
        fn on_permission_result(&self, request_code: i32, granted: bool) {
            self.events
                .lock()
                .push(format!("result:{request_code}:{granted}"));
        }
    }

    impl ServiceConnection for Recorder {
        fn on_service_connected(&self, _service: Arc<dyn FileService>) {
            self.events.lock().push("connected".into());
        }
        fn on_service_disconnected(&self) {
            self.events.lock().push("disconnected".into());
        }
    }

    fn descriptor(version: u32) -> ServiceDescriptor {
        ServiceDescriptor::new(ComponentName::new("com.sim", "com.sim.Files")).version(version)
    }

    #[test]
    fn test_listener_is_sticky() {
        let broker = InProcessBroker::new();
        broker.start();

        let recorder = Arc::new(Recorder::default());
        broker.add_listener(recorder.clone()).unwrap();
        assert_eq!(*recorder.events.lock(), vec!["received"]);
    }

    #[test]
    fn test_queries_fail_when_not_installed() {
        let broker = InProcessBroker::not_installed();
        assert!(matches!(broker.ping_binder(), Err(ConnectError::NotInstalled)));
        assert!(broker.check_self_permission().is_err());
    }

    #[test]
    fn test_manual_prompt_queue() {
        let broker = InProcessBroker::new();
        broker.start();
        let recorder = Arc::new(Recorder::default());
        broker.add_listener(recorder.clone()).unwrap();

        broker.request_permission(5).unwrap();
        assert_eq!(broker.outstanding_prompts(), 1);
        assert!(broker.answer_prompt(true));
        assert!(!broker.answer_prompt(true));
        assert!(broker.check_self_permission().unwrap());
        assert_eq!(recorder.events.lock().last().unwrap(), "result:5:true");
    }

    #[test]
    fn test_bind_requires_grant() {
        let broker = InProcessBroker::new();
        broker.start();
        let recorder = Arc::new(Recorder::default());
        let result = broker.bind_user_service(&descriptor(1), recorder);
        assert!(matches!(result, Err(ConnectError::PermissionDenied)));
    }

    #[test]
    fn test_new_version_retires_old_process() {
        let broker = InProcessBroker::new();
        broker.set_granted(true);
        broker.start();

        let old = Arc::new(Recorder::default());
        broker.bind_user_service(&descriptor(1), old.clone()).unwrap();
        let new = Arc::new(Recorder::default());
        broker.bind_user_service(&descriptor(2), new.clone()).unwrap();

        assert_eq!(*old.events.lock(), vec!["connected", "disconnected"]);
        assert_eq!(*new.events.lock(), vec!["connected"]);
        assert_eq!(broker.live_processes(), 1);
    }

    #[test]
    fn test_deferred_connect() {
        let broker = InProcessBroker::new();
        broker.set_granted(true);
        broker.set_connect_policy(ConnectPolicy::Deferred);
        broker.start();

        let recorder = Arc::new(Recorder::default());
        broker.bind_user_service(&descriptor(1), recorder.clone()).unwrap();
        assert!(recorder.events.lock().is_empty());

        assert_eq!(broker.complete_pending_binds(), 1);
        assert_eq!(*recorder.events.lock(), vec!["connected"]);
    }

    #[test]
    fn test_daemon_survives_plain_unbind() {
        let broker = InProcessBroker::new();
        broker.set_granted(true);
        broker.start();

        let recorder = Arc::new(Recorder::default());
        let connection: Arc<dyn ServiceConnection> = recorder;
        broker.bind_user_service(&descriptor(1), connection.clone()).unwrap();

        broker.unbind_user_service(&descriptor(1), &connection, false).unwrap();
        assert_eq!(broker.live_processes(), 1);

        broker.unbind_user_service(&descriptor(1), &connection, true).unwrap();
        assert_eq!(broker.live_processes(), 0);
    }
}
