//! Error types for secret resolution.

use crate::domain::{ConnectorId, SecretType};
use thiserror::Error;

/// Result type for secrets operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretsError {
    /// No stored version exists for the connector and type.
    #[error("No {secret_type} secret stored for connector {connector_id}")]
    NotFound { connector_id: ConnectorId, secret_type: SecretType },

    /// Every stored version has passed its expiry.
    #[error("All {secret_type} secrets for connector {connector_id} have expired")]
    Expired { connector_id: ConnectorId, secret_type: SecretType },

    /// Authentication tag mismatch, wrong key or malformed record.
    #[error("Failed to decrypt secret: {reason}")]
    DecryptionFailed { reason: String },

    /// Encryption key misconfiguration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Configuration store could not be read.
    #[error("Secret store unavailable: {message}")]
    StoreUnavailable { message: String },
}

impl SecretsError {
    pub fn not_found(connector_id: &ConnectorId, secret_type: SecretType) -> Self {
        Self::NotFound { connector_id: connector_id.clone(), secret_type }
    }

    pub fn expired(connector_id: &ConnectorId, secret_type: SecretType) -> Self {
        Self::Expired { connector_id: connector_id.clone(), secret_type }
    }

    pub fn decryption_failed(reason: impl Into<String>) -> Self {
        Self::DecryptionFailed { reason: reason.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable { message: message.into() }
    }
}
