//! # Metrics Collection
//!
//! Prometheus metrics for the request pipeline. The `metrics` macros are
//! no-ops until an exporter is installed, so recording is always safe.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Metrics recorder that tracks gateway metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a completed proxied request
    pub fn record_proxied_request(&self, tenant: &str, outcome: &str, status: u16, duration: f64) {
        let labels = [("outcome", outcome.to_string()), ("status", status.to_string())];
        counter!("gateway_requests_total", &labels).increment(1);

        let tenant_labels = [("tenant", tenant.to_string())];
        histogram!("gateway_request_duration_seconds", &tenant_labels).record(duration);
    }

    /// Record a single upstream attempt
    pub fn record_upstream_attempt(&self, connector: &str, success: bool, duration: f64) {
        let status = if success { "success" } else { "failure" };
        let labels = [("connector", connector.to_string()), ("status", status.to_string())];
        counter!("gateway_upstream_attempts_total", &labels).increment(1);

        let duration_labels = [("connector", connector.to_string())];
        histogram!("gateway_upstream_duration_seconds", &duration_labels).record(duration);
    }

    /// Record a retry scheduled after a failed attempt
    pub fn record_retry(&self, connector: &str) {
        let labels = [("connector", connector.to_string())];
        counter!("gateway_upstream_retries_total", &labels).increment(1);
    }

    /// Record a cache lookup result
    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        counter!("gateway_cache_lookups_total", "result" => result).increment(1);
    }

    /// Update the number of entries held by the response cache
    pub fn update_cache_entries(&self, count: usize) {
        gauge!("gateway_cache_entries").set(count as f64);
    }

    /// Record a breaker state transition
    pub fn record_breaker_transition(&self, connector: &str, from: &str, to: &str) {
        let labels = [
            ("connector", connector.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
        ];
        counter!("gateway_breaker_transitions_total", &labels).increment(1);
    }

    /// Record a call rejected by an open breaker
    pub fn record_breaker_rejection(&self, connector: &str) {
        let labels = [("connector", connector.to_string())];
        counter!("gateway_breaker_rejections_total", &labels).increment(1);
    }

    /// Record an outbound URL rejected by the SSRF guard
    pub fn record_ssrf_rejection(&self) {
        counter!("gateway_ssrf_rejections_total").increment(1);
    }

    /// Register descriptions so series appear before the first request
    pub fn register_gateway_metrics(&self) {
        describe_counter!("gateway_requests_total", Unit::Count, "Proxied requests by outcome");
        describe_histogram!(
            "gateway_request_duration_seconds",
            Unit::Seconds,
            "End-to-end pipeline latency"
        );
        describe_counter!("gateway_upstream_attempts_total", Unit::Count, "Upstream call attempts");
        describe_histogram!(
            "gateway_upstream_duration_seconds",
            Unit::Seconds,
            "Latency of individual upstream attempts"
        );
        describe_counter!("gateway_upstream_retries_total", Unit::Count, "Upstream retries");
        describe_counter!("gateway_cache_lookups_total", Unit::Count, "Response cache lookups");
        describe_gauge!("gateway_cache_entries", Unit::Count, "Entries in the response cache");
        describe_counter!(
            "gateway_breaker_transitions_total",
            Unit::Count,
            "Circuit breaker state transitions"
        );
        describe_counter!(
            "gateway_breaker_rejections_total",
            Unit::Count,
            "Calls rejected by an open circuit"
        );
        describe_counter!("gateway_ssrf_rejections_total", Unit::Count, "Blocked outbound URLs");

        counter!("gateway_cache_lookups_total", "result" => "hit").absolute(0);
        counter!("gateway_cache_lookups_total", "result" => "miss").absolute(0);
        counter!("gateway_ssrf_rejections_total").absolute(0);
    }
}

static EXPORTER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Initialize the Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    if EXPORTER_INSTALLED.get().is_some() {
        warn!("Metrics exporter already installed");
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => return Ok(()),
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    let _ = EXPORTER_INSTALLED.set(());
    MetricsRecorder::new().register_gateway_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
