//! Upstream connector definitions
//!
//! A connector is a tenant's upstream service: where to send traffic, how to
//! authenticate, and how aggressively to retry and trip the breaker.

use super::id::{ConnectorId, TenantId};
use super::secret::SecretType;
use crate::errors::{Error, Result};
use crate::ssrf::SsrfGuard;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default header used for api-key credentials
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// How credentials are attached to outbound requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    None,
    ApiKey,
    Bearer,
    Basic,
    #[serde(rename = "oauth2_client_credentials")]
    OAuth2ClientCredentials,
    Custom,
}

impl AuthType {
    /// Secret type that must be resolved before calling the upstream
    pub fn required_secret(&self) -> Option<SecretType> {
        match self {
            Self::None => None,
            Self::ApiKey => Some(SecretType::ApiKey),
            Self::Bearer => Some(SecretType::BearerToken),
            Self::Basic => Some(SecretType::BasicPassword),
            Self::OAuth2ClientCredentials => Some(SecretType::OAuthClientSecret),
            Self::Custom => Some(SecretType::Custom),
        }
    }
}

/// Auth settings beyond the secret itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Header name for api-key and custom auth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AuthSettings {
    pub fn header_name(&self) -> &str {
        self.header_name.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER)
    }
}

/// Exponential backoff between retry attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { initial_ms: 100, max_ms: 2_000, multiplier: 2.0, jitter: true }
    }
}

impl BackoffPolicy {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub enabled: bool,
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { enabled: false, max_attempts: 3, backoff: BackoffPolicy::default() }
    }
}

impl RetryPolicy {
    /// Attempts permitted for a call, never less than one
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerPolicy {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self { enabled: true, failure_threshold: 5, reset_timeout_ms: 30_000 }
    }
}

impl CircuitBreakerPolicy {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Upstream connector as stored for a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub id: ConnectorId,
    pub tenant_id: TenantId,
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_auth_type")]
    pub auth_type: AuthType,
    #[serde(default)]
    pub auth: AuthSettings,
    /// Per-attempt timeout; the gateway default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerPolicy,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_auth_type() -> AuthType {
    AuthType::None
}

fn default_true() -> bool {
    true
}

impl Connector {
    pub fn timeout(&self, fallback: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(fallback)
    }

    /// Validate the connector before it is admitted to the store.
    ///
    /// The base URL (and the OAuth2 token endpoint, when configured) must pass
    /// the SSRF guard, including DNS resolution.
    pub async fn validate(&self, guard: &SsrfGuard) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation(format!("Connector '{}' has an empty name", self.id)));
        }

        guard.validate(&self.base_url).await.map_err(|e| {
            Error::validation(format!("Connector '{}' base URL rejected: {}", self.id, e))
        })?;

        if self.retry.enabled && self.retry.max_attempts == 0 {
            return Err(Error::validation(format!(
                "Connector '{}' retry policy needs at least one attempt",
                self.id
            )));
        }

        if self.retry.backoff.multiplier < 1.0 {
            return Err(Error::validation(format!(
                "Connector '{}' backoff multiplier must be at least 1.0",
                self.id
            )));
        }

        if self.circuit_breaker.enabled && self.circuit_breaker.failure_threshold == 0 {
            return Err(Error::validation(format!(
                "Connector '{}' failure threshold must be at least 1",
                self.id
            )));
        }

        match self.auth_type {
            AuthType::Basic if self.auth.username.is_none() => {
                return Err(Error::validation(format!(
                    "Connector '{}' uses basic auth without a username",
                    self.id
                )));
            }
            AuthType::OAuth2ClientCredentials => {
                let token_url = self.auth.token_url.as_deref().ok_or_else(|| {
                    Error::validation(format!(
                        "Connector '{}' is missing an OAuth2 token URL",
                        self.id
                    ))
                })?;
                if self.auth.client_id.is_none() {
                    return Err(Error::validation(format!(
                        "Connector '{}' is missing an OAuth2 client id",
                        self.id
                    )));
                }
                guard.validate(token_url).await.map_err(|e| {
                    Error::validation(format!("Connector '{}' token URL rejected: {}", self.id, e))
                })?;
            }
            _ => {}
        }

        Ok(())
    }
}
