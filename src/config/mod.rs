//! # Configuration Management
//!
//! Layered configuration for the gateway: compiled defaults, an optional
//! config file and `FLOWGATE_*` environment variables.

pub mod settings;

pub use settings::{
    AppConfig, BootstrapConfig, CacheConfig, ObservabilityConfig, SecretsConfig, ServerConfig,
    UpstreamConfig, ENV_PREFIX,
};
