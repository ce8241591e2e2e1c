//! Typed pipeline failures
//!
//! The step that failed determines the status code. Public messages are
//! fixed strings so no upstream detail, internal address or credential ever
//! reaches the caller; the full error is logged instead.

use crate::circuit_breaker::CircuitOpen;
use crate::domain::{ConnectorId, RouteId};
use crate::routing::RoutingError;
use crate::secrets::SecretsError;
use crate::ssrf::SsrfError;
use crate::store::AuditOutcome;
use crate::transform::TransformError;
use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("No route found")]
    NoRouteFound,

    #[error("Outbound URL blocked: {0}")]
    SsrfBlocked(#[from] SsrfError),

    #[error("Circuit open for connector '{connector_id}'")]
    CircuitOpen { connector_id: ConnectorId, retry_after: Duration },

    #[error("Upstream '{connector_id}' timed out")]
    UpstreamTimeout { connector_id: ConnectorId },

    #[error("Upstream '{connector_id}' unreachable: {reason}")]
    UpstreamUnreachable { connector_id: ConnectorId, reason: String },

    #[error("Upstream '{connector_id}' response exceeds {limit} bytes")]
    UpstreamResponseTooLarge { connector_id: ConnectorId, limit: usize },

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Secret decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Secret expired: {0}")]
    SecretExpired(String),

    #[error("Invalid transform on route '{route_id}': {source}")]
    InvalidTransform { route_id: RouteId, source: TransformError },

    #[error("Authentication required")]
    Unauthorized,

    #[error("Caller role is not permitted on this route")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoRouteFound => StatusCode::NOT_FOUND,
            Self::SsrfBlocked(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamTimeout { .. } | Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamUnreachable { .. } | Self::UpstreamResponseTooLarge { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::SecretNotFound(_)
            | Self::DecryptionFailed(_)
            | Self::SecretExpired(_)
            | Self::InvalidTransform { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoRouteFound => "no_route_found",
            Self::SsrfBlocked(_) => "ssrf_blocked",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::UpstreamUnreachable { .. } => "upstream_unreachable",
            Self::UpstreamResponseTooLarge { .. } => "upstream_response_too_large",
            Self::SecretNotFound(_) => "secret_not_found",
            Self::DecryptionFailed(_) => "decryption_failed",
            Self::SecretExpired(_) => "secret_expired",
            Self::InvalidTransform { .. } => "invalid_transform",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Caller-facing message
    pub fn public_message(&self) -> String {
        match self {
            Self::NoRouteFound => "No route matches the request".to_string(),
            Self::SsrfBlocked(_) => "request blocked".to_string(),
            Self::CircuitOpen { .. } => "Upstream temporarily unavailable".to_string(),
            Self::UpstreamTimeout { .. } => "Upstream timed out".to_string(),
            Self::UpstreamUnreachable { .. } => "Upstream unreachable".to_string(),
            Self::UpstreamResponseTooLarge { .. } => "Upstream response too large".to_string(),
            Self::SecretNotFound(_) | Self::DecryptionFailed(_) | Self::SecretExpired(_) => {
                "Upstream credentials unavailable".to_string()
            }
            Self::InvalidTransform { .. } => "Route transform could not be applied".to_string(),
            Self::Unauthorized => "Authentication required".to_string(),
            Self::Forbidden => "Access denied".to_string(),
            // constructed only with gateway-authored text
            Self::BadRequest(message) => message.clone(),
            Self::DeadlineExceeded => "Request deadline exceeded".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Hint for the `Retry-After` header
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn audit_outcome(&self) -> AuditOutcome {
        match self {
            Self::NoRouteFound => AuditOutcome::NoRoute,
            Self::SsrfBlocked(_) => AuditOutcome::SsrfRejected,
            Self::CircuitOpen { .. } => AuditOutcome::CircuitRejected,
            Self::Unauthorized | Self::Forbidden | Self::BadRequest(_) => AuditOutcome::Rejected,
            _ => AuditOutcome::Failure,
        }
    }
}

impl From<CircuitOpen> for GatewayError {
    fn from(open: CircuitOpen) -> Self {
        Self::CircuitOpen { connector_id: open.connector_id, retry_after: open.retry_after }
    }
}

impl From<RoutingError> for GatewayError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::NoRouteFound { .. } => Self::NoRouteFound,
            RoutingError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<SecretsError> for GatewayError {
    fn from(err: SecretsError) -> Self {
        match err {
            SecretsError::NotFound { .. } => Self::SecretNotFound(err.to_string()),
            SecretsError::Expired { .. } => Self::SecretExpired(err.to_string()),
            SecretsError::DecryptionFailed { .. } => Self::DecryptionFailed(err.to_string()),
            SecretsError::ConfigError { .. } | SecretsError::StoreUnavailable { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}
