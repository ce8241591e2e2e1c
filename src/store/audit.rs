//! Audit events for proxied calls

use crate::domain::{ConnectorId, CorrelationId, HttpMethod, RouteId, TenantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    CircuitRejected,
    SsrfRejected,
    NoRoute,
    CacheHit,
    /// Refused before any upstream work (authorization, bad input)
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::CircuitRejected => "circuit_rejected",
            Self::SsrfRejected => "ssrf_rejected",
            Self::NoRoute => "no_route",
            Self::CacheHit => "cache_hit",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One proxied call. Never carries payloads or credentials.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    pub route_id: Option<RouteId>,
    pub connector_id: Option<ConnectorId>,
    pub method: HttpMethod,
    pub path: String,
    pub outcome: AuditOutcome,
    pub status: u16,
    pub duration_ms: u64,
    pub correlation_id: CorrelationId,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        tenant_id: TenantId,
        method: HttpMethod,
        path: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            tenant_id,
            route_id: None,
            connector_id: None,
            method,
            path: path.into(),
            outcome: AuditOutcome::Success,
            status: 0,
            duration_ms: 0,
            correlation_id,
            timestamp: Utc::now(),
        }
    }

    pub fn with_route(mut self, route_id: RouteId, connector_id: ConnectorId) -> Self {
        self.route_id = Some(route_id);
        self.connector_id = Some(connector_id);
        self
    }

    pub fn finish(mut self, outcome: AuditOutcome, status: u16, duration: Duration) -> Self {
        self.outcome = outcome;
        self.status = status;
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record an event. Sinks handle their own failures.
    async fn record(&self, event: AuditEvent);
}

/// Writes audit events as structured log lines on the `flowgate::audit` target
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            target: "flowgate::audit",
            tenant_id = %event.tenant_id,
            route_id = event.route_id.as_ref().map(|id| id.as_str()),
            connector_id = event.connector_id.as_ref().map(|id| id.as_str()),
            method = %event.method,
            path = %event.path,
            outcome = %event.outcome,
            status = event.status,
            duration_ms = event.duration_ms,
            correlation_id = %event.correlation_id,
            "Proxied call"
        );
    }
}

/// Keeps events in memory; used by tests and diagnostics
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn outcomes(&self) -> Vec<AuditOutcome> {
        self.events().into_iter().map(|e| e.outcome).collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => {
                warn!("Audit recorder lock poisoned");
                poisoned.into_inner().push(event);
            }
        }
    }
}
