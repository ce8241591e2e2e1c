//! # Configuration Settings
//!
//! Defines the configuration structure for the Flowgate gateway. Values are
//! layered: compiled defaults, then an optional config file, then
//! `FLOWGATE_*` environment variables (nested keys use `__`, e.g.
//! `FLOWGATE_SERVER__PORT=8443`).

use crate::errors::{Error, Result};
use crate::secrets::SecretString;
use crate::ssrf::SsrfConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix for all settings
pub const ENV_PREFIX: &str = "FLOWGATE";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Inbound HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Outbound URL safety policy
    pub ssrf: SsrfConfig,

    /// Response cache configuration
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Secret decryption configuration
    #[validate(nested)]
    pub secrets: SecretsConfig,

    /// Outbound HTTP client configuration
    #[validate(nested)]
    pub upstream: UpstreamConfig,

    /// Bootstrap document with tenants' routes, connectors and secrets
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the environment only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if self.observability.enable_metrics && self.observability.metrics_port == self.server.port
        {
            return Err(Error::validation("Server and metrics ports cannot be the same"));
        }

        if self.upstream.request_timeout() > self.server.request_deadline() {
            return Err(Error::validation(
                "Upstream default timeout cannot exceed the inbound request deadline",
            ));
        }

        Ok(())
    }
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Deadline for a whole proxied request in milliseconds
    #[validate(range(
        min = 100,
        max = 300000,
        message = "Request deadline must be between 100ms and 300s"
    ))]
    pub request_deadline_ms: u64,

    /// Maximum inbound request body size in bytes
    #[validate(range(min = 1024, message = "Max body size must be at least 1KB"))]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_deadline_ms: 30_000,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the request deadline as Duration
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics exporter
    pub enable_metrics: bool,

    /// Metrics exporter port
    #[validate(range(min = 1, max = 65535, message = "Metrics port must be between 1 and 65535"))]
    pub metrics_port: u16,

    /// Service name attached to startup logs
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level or full env-filter directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "flowgate".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.enable_metrics {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        } else {
            None
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held by the in-process store
    #[validate(range(
        min = 1,
        max = 1000000,
        message = "Cache capacity must be between 1 and 1000000"
    ))]
    pub capacity: usize,

    /// Bound on a single cache store round trip in milliseconds
    #[validate(range(min = 1, max = 10000, message = "Cache timeout must be between 1ms and 10s"))]
    pub store_timeout_ms: u64,

    /// Maximum response body size stored in the cache
    pub max_entry_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 10_000, store_timeout_ms: 250, max_entry_bytes: 1024 * 1024 }
    }
}

impl CacheConfig {
    /// Get the store timeout as Duration
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Secret decryption configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SecretsConfig {
    /// Base64-encoded 32-byte AES-256-GCM master key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_key: Option<SecretString>,

    /// Key version for rotation tracking
    #[validate(length(min = 1, message = "Key version cannot be empty"))]
    pub key_version: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self { master_key: None, key_version: "default".to_string() }
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Timeout used when a connector does not set its own
    #[validate(range(
        min = 10,
        max = 300000,
        message = "Upstream timeout must be between 10ms and 300s"
    ))]
    pub default_timeout_ms: u64,

    /// User agent sent on outbound requests
    #[validate(length(min = 1, message = "User agent cannot be empty"))]
    pub user_agent: String,

    /// Maximum upstream response body relayed to the caller
    #[validate(range(min = 1024, message = "Max response size must be at least 1KB"))]
    pub max_response_bytes: usize,

    /// Idle connection lifetime in the outbound pool
    pub pool_idle_timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            user_agent: format!("flowgate/{}", crate::VERSION),
            max_response_bytes: 10 * 1024 * 1024,
            pool_idle_timeout_seconds: 90,
        }
    }
}

impl UpstreamConfig {
    /// Get the default request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Location of the bootstrap document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Path to a YAML document of tenants' routes, connectors and secrets
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_bind_address() {
        let config =
            ServerConfig { host: "127.0.0.1".to_string(), port: 9000, ..Default::default() };
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.request_deadline(), Duration::from_secs(30));
    }

    #[test]
    fn test_observability_metrics_address() {
        let config = ObservabilityConfig { enable_metrics: true, ..Default::default() };
        assert_eq!(config.metrics_bind_address(), Some("0.0.0.0:9090".to_string()));

        let disabled = ObservabilityConfig::default();
        assert_eq!(disabled.metrics_bind_address(), None);
    }

    #[test]
    fn test_config_validation_errors() {
        let mut config = AppConfig::default();
        config.observability.enable_metrics = true;
        config.observability.metrics_port = config.server.port;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.request_deadline_ms = 1_000;
        config.upstream.default_timeout_ms = 5_000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_key_is_not_serialized() {
        let mut config = AppConfig::default();
        config.secrets.master_key = Some(SecretString::new("c2VjcmV0"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("c2VjcmV0"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  port: 9443\ncache:\n  capacity: 42\nssrf:\n  dns_timeout_ms: 500"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9443);
        assert_eq!(config.cache.capacity, 42);
        assert_eq!(config.ssrf.dns_timeout_ms, 500);
        // untouched sections keep their defaults
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
