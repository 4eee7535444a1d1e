//! Container configuration.

use crate::specialize::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the container server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Where the user artifact is read from on specialization.
    pub code_path: PathBuf,
    /// Path of the load trigger endpoint.
    pub load_endpoint_path: String,
    /// Type to instantiate when the artifact exports several.
    pub function_type: Option<String>,
    /// Whether to serve `/_health`.
    pub enable_health: bool,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Per-request timeout for the function, in seconds.
    pub request_timeout: Option<u64>,
    /// Upper bound for loading and instantiating the artifact, in seconds.
    pub specialize_timeout: u64,
    /// Directory for staged artifact copies.
    pub scratch_dir: PathBuf,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            code_path: PathBuf::from("/userfunc/user"),
            load_endpoint_path: "/specialize".to_string(),
            function_type: None,
            enable_health: true,
            max_body_size: 10 * 1024 * 1024, // 10MB
            request_timeout: None,
            specialize_timeout: 30,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidField {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl EnvConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the artifact path.
    pub fn code_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.code_path = path.into();
        self
    }

    /// Set the load trigger path.
    pub fn load_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.load_endpoint_path = path.into();
        self
    }

    /// Require a specific function type.
    pub fn function_type(mut self, name: Option<String>) -> Self {
        self.function_type = name;
        self
    }

    pub fn enable_health(mut self, enabled: bool) -> Self {
        self.enable_health = enabled;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn request_timeout(mut self, secs: Option<u64>) -> Self {
        self.request_timeout = secs;
        self
    }

    pub fn specialize_timeout(mut self, secs: u64) -> Self {
        self.specialize_timeout = secs;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy::from(self.function_type.clone())
    }

    pub fn request_timeout_duration(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }

    pub fn specialize_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.specialize_timeout)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.load_endpoint_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "load_endpoint_path",
                "must start with '/'",
            ));
        }
        if self.load_endpoint_path == "/" {
            return Err(ConfigError::invalid(
                "load_endpoint_path",
                "must not be the function path '/'",
            ));
        }
        if self.specialize_timeout == 0 {
            return Err(ConfigError::invalid("specialize_timeout", "must be positive"));
        }
        if self.request_timeout == Some(0) {
            return Err(ConfigError::invalid("request_timeout", "must be positive"));
        }
        if let Some(name) = &self.function_type {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("function_type", "must not be empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EnvConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8888");
        assert_eq!(config.code_path, PathBuf::from("/userfunc/user"));
        assert_eq!(config.load_endpoint_path, "/specialize");
        assert_eq!(config.selection_policy(), SelectionPolicy::FirstByName);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EnvConfig::new()
            .host("127.0.0.1")
            .port(9000)
            .function_type(Some("user::Hello".to_string()))
            .request_timeout(Some(5));

        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(
            config.selection_policy(),
            SelectionPolicy::Named("user::Hello".to_string())
        );
        assert_eq!(config.request_timeout_duration(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EnvConfig::new().load_endpoint_path("specialize").validate().is_err());
        assert!(EnvConfig::new().load_endpoint_path("/").validate().is_err());
        assert!(EnvConfig::new().specialize_timeout(0).validate().is_err());
        assert!(EnvConfig::new().request_timeout(Some(0)).validate().is_err());

        let err = EnvConfig::new()
            .function_type(Some(" ".to_string()))
            .validate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid field 'function_type': must not be empty"
        );
    }
}
