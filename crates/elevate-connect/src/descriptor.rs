//! Identity of the remote service the broker is asked to bind

use serde::{Deserialize, Serialize};
use std::fmt;

/// Executable component reference: owning package plus service class
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentName {
    pub package: String,
    pub class_name: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class_name: class_name.into(),
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class_name)
    }
}

/// Arguments for binding a user service through the broker
///
/// Built once when the bridge is created and never mutated. `version` is the
/// compatibility contract with the service binary: bump it together with any
/// change to the service's interface, or the broker may hand back a cached
/// process running the old code.
///
/// # Example
///
/// ```
/// use elevate_connect::{ComponentName, ServiceDescriptor};
///
/// let descriptor = ServiceDescriptor::new(ComponentName::new(
///     "com.example.dronestuff",
///     "com.example.dronestuff.FileService",
/// ))
/// .daemon(false)
/// .process_name_suffix("file_service")
/// .version(7);
///
/// assert_eq!(descriptor.process_name(), "com.example.dronestuff:file_service");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceDescriptor {
    component: ComponentName,
    process_name_suffix: String,
    daemon: bool,
    debuggable: bool,
    version: u32,
}

impl ServiceDescriptor {
    /// Daemon by default, matching the broker's own default
    pub fn new(component: ComponentName) -> Self {
        Self {
            component,
            process_name_suffix: "p".to_string(),
            daemon: true,
            debuggable: false,
            version: 0,
        }
    }

    /// `false` ties the service process to the broker binder's lifetime
    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn process_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.process_name_suffix = suffix.into();
        self
    }

    pub fn debuggable(mut self, debuggable: bool) -> Self {
        self.debuggable = debuggable;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn component(&self) -> &ComponentName {
        &self.component
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    pub fn is_debuggable(&self) -> bool {
        self.debuggable
    }

    pub fn service_version(&self) -> u32 {
        self.version
    }

    /// Key the broker uses to find an existing process for this service
    pub fn tag(&self) -> String {
        self.component.to_string()
    }

    pub fn process_name(&self) -> String {
        format!("{}:{}", self.component.package, self.process_name_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component() -> ComponentName {
        ComponentName::new("com.example.app", "com.example.app.FileService")
    }

    #[test]
    fn test_defaults() {
        let d = ServiceDescriptor::new(component());
        assert!(d.is_daemon());
        assert!(!d.is_debuggable());
        assert_eq!(d.service_version(), 0);
        assert_eq!(d.tag(), "com.example.app/com.example.app.FileService");
    }

    #[test]
    fn test_version_distinguishes_descriptors() {
        let v1 = ServiceDescriptor::new(component()).version(1);
        let v2 = ServiceDescriptor::new(component()).version(2);
        assert_ne!(v1, v2);
        assert_eq!(v1.tag(), v2.tag());
    }
}
