//! On-demand decryption of connector credentials

use super::encryption::SecretEncryption;
use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::domain::{ConnectorId, SecretType};
use crate::store::ConfigStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Resolves the active plaintext credential for a connector.
///
/// Nothing is cached: each call reads the store and decrypts, and the
/// returned [`SecretString`] zeroes itself when the outbound call drops it.
#[derive(Clone)]
pub struct SecretResolver {
    store: Arc<dyn ConfigStore>,
    encryption: Option<SecretEncryption>,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn ConfigStore>, encryption: Option<SecretEncryption>) -> Self {
        Self { store, encryption }
    }

    /// Decrypt the highest non-expired version for `(connector_id, secret_type)`.
    ///
    /// `Expired` is returned only when versions exist and all of them have
    /// expired; no versions at all is `NotFound`.
    #[instrument(skip_all, fields(connector_id = %connector_id, secret_type = %secret_type))]
    pub async fn resolve(
        &self,
        connector_id: &ConnectorId,
        secret_type: SecretType,
    ) -> Result<SecretString> {
        let records = self
            .store
            .secrets(connector_id, secret_type)
            .await
            .map_err(|e| SecretsError::store_unavailable(e.to_string()))?;

        let candidates: Vec<_> = records
            .iter()
            .filter(|r| &r.connector_id == connector_id && r.secret_type == secret_type)
            .collect();

        if candidates.is_empty() {
            return Err(SecretsError::not_found(connector_id, secret_type));
        }

        let now = Utc::now();
        let record = candidates
            .iter()
            .filter(|r| !r.is_expired_at(now))
            .max_by_key(|r| r.version)
            .ok_or_else(|| {
                warn!("All stored secret versions have expired");
                SecretsError::expired(connector_id, secret_type)
            })?;

        let encryption = self
            .encryption
            .as_ref()
            .ok_or_else(|| SecretsError::decryption_failed("no master key configured"))?;

        let secret = encryption.open_record(record)?;
        debug!(version = record.version, "Resolved connector secret");
        Ok(secret)
    }
}

impl std::fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretResolver")
            .field("encryption", &self.encryption)
            .finish_non_exhaustive()
    }
}
