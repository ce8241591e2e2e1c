//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the gateway.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use self::metrics::{init_metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging and, when enabled, the metrics exporter
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;
    init_metrics(config)?;

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        metrics_enabled = %config.enable_metrics,
        "Observability initialized successfully"
    );

    Ok(())
}
