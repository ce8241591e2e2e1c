//! # Structured Logging
//!
//! Subscriber setup and span macros for the gateway. Log output is either
//! human readable or JSON, selected by `ObservabilityConfig::json_logging`.
//! `RUST_LOG` takes precedence over the configured level when set.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Create a tracing span for an inbound proxied request.
///
/// Tenant and correlation id start empty and are recorded once the caller
/// context has been extracted:
///
/// ```rust,ignore
/// let span = request_span!("GET", "/api/posts");
/// span.record("tenant_id", "acme");
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            tenant_id = tracing::field::Empty,
            correlation_id = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, tenant_id = $tenant:expr, correlation_id = $corr:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            tenant_id = %$tenant,
            correlation_id = %$corr
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            tenant_id = tracing::field::Empty,
            correlation_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for one upstream attempt
#[macro_export]
macro_rules! upstream_span {
    ($connector_id:expr, $attempt:expr) => {
        tracing::debug_span!(
            "upstream_call",
            connector_id = %$connector_id,
            attempt = $attempt,
            status = tracing::field::Empty
        )
    };
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed, which only happens when this
/// is called twice in one process.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(&config.log_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true).with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to install log subscriber: {}", e)))
}

fn configured_filter(log_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(log_level)
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", log_level, e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        request_deadline_ms = config.server.request_deadline_ms,
        metrics_enabled = %config.observability.enable_metrics,
        cache_capacity = config.cache.capacity,
        blocked_cidrs = config.ssrf.blocked_cidrs.len(),
        secrets_configured = config.secrets.master_key.is_some(),
        bootstrap = ?config.bootstrap.path,
        "Flowgate gateway configuration"
    );
}
