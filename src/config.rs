/*!
 * Configuration for the Elevate bridge
 */

use elevate_connect::{ComponentName, ServiceDescriptor, DEFAULT_PERMISSION_REQUEST_CODE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::channel::DEFAULT_CHANNEL_NAME;
use crate::error::{ElevateError, Result};

/// Main configuration for a bridge session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Name of the host channel the bridge answers on
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Remote service to bind
    #[serde(default)]
    pub service: ServiceConfig,

    /// Request code tagging this bridge's permission prompts
    #[serde(default = "default_request_code")]
    pub permission_request_code: i32,

    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            service: ServiceConfig::default(),
            permission_request_code: default_request_code(),
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// Bind arguments for the remote file service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_package")]
    pub package: String,

    #[serde(default = "default_class_name")]
    pub class_name: String,

    #[serde(default = "default_process_suffix")]
    pub process_name_suffix: String,

    /// `false` ties the service to the broker binder's lifetime
    #[serde(default)]
    pub daemon: bool,

    #[serde(default)]
    pub debuggable: bool,

    /// Bump whenever the service's interface changes
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            class_name: default_class_name(),
            process_name_suffix: default_process_suffix(),
            daemon: false,
            debuggable: false,
            version: default_version(),
        }
    }
}

impl ServiceConfig {
    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor::new(ComponentName::new(&self.package, &self.class_name))
            .process_name_suffix(&self.process_name_suffix)
            .daemon(self.daemon)
            .debuggable(self.debuggable)
            .version(self.version)
    }
}

/// Logging level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// Everything
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}

fn default_request_code() -> i32 {
    DEFAULT_PERMISSION_REQUEST_CODE
}

fn default_package() -> String {
    "com.example.dronestuff".to_string()
}

fn default_class_name() -> String {
    "com.example.dronestuff.FileService".to_string()
}

fn default_process_suffix() -> String {
    "file_service".to_string()
}

fn default_version() -> u32 {
    1
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_name.is_empty() {
            return Err(ElevateError::Config("channel_name must not be empty".into()));
        }
        if self.service.package.is_empty() || self.service.class_name.is_empty() {
            return Err(ElevateError::Config(
                "service package and class_name are required".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.channel_name, "com.example.dronestuff/shizuku");
        assert_eq!(config.permission_request_code, 1001);
        assert!(!config.service.daemon);

        let descriptor = config.service.descriptor();
        assert_eq!(descriptor.process_name(), "com.example.dronestuff:file_service");
        assert_eq!(descriptor.service_version(), 1);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            log_level = "debug"

            [service]
            version = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.service.version, 4);
        assert_eq!(config.service.package, "com.example.dronestuff");
        assert_eq!(config.permission_request_code, 1001);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("elevate.toml");

        let mut config = BridgeConfig::default();
        config.service.daemon = true;
        config.log_file = Some(dir.path().join("bridge.log"));
        config.to_file(&path).unwrap();

        assert_eq!(BridgeConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_validation_rejects_empty_class() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[service]\nclass_name = \"\"\n").unwrap();

        let err = BridgeConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ElevateError::Config(_)));
    }
}
