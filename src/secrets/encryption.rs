//! Secret encryption using AES-256-GCM
//!
//! Every record carries its own random 12-byte nonce and a detached 16-byte
//! authentication tag. The additional authenticated data binds the record to
//! its connector, secret type and version, so ciphertext copied onto another
//! connector fails authentication instead of decrypting.
//!
//! The master key is configured as `FLOWGATE_SECRETS__MASTER_KEY`, a
//! base64-encoded 32-byte key (`openssl rand -base64 32`).

use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::config::SecretsConfig;
use crate::domain::{ConnectorId, SecretId, SecretType, StoredSecret};
use base64::Engine;
use chrono::{DateTime, Utc};
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use zeroize::Zeroizing;

/// Size of AES-256-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
pub const TAG_SIZE: usize = 16;

/// Identity a ciphertext is bound to through the AEAD associated data
#[derive(Debug, Clone, Copy)]
pub struct SecretBinding<'a> {
    pub connector_id: &'a ConnectorId,
    pub secret_type: SecretType,
    pub version: u32,
}

impl<'a> SecretBinding<'a> {
    pub fn of(record: &'a StoredSecret) -> Self {
        Self {
            connector_id: &record.connector_id,
            secret_type: record.secret_type,
            version: record.version,
        }
    }

    fn aad(&self) -> Vec<u8> {
        format!("flowgate:{}:{}:{}", self.connector_id, self.secret_type, self.version).into_bytes()
    }
}

/// Ciphertext, nonce and tag as stored
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Secret encryption service
#[derive(Clone)]
pub struct SecretEncryption {
    key_bytes: Arc<Zeroizing<[u8; 32]>>,
    key_version: String,
    rng: Arc<SystemRandom>,
}

impl SecretEncryption {
    /// Create the service from configuration; fails when no key is configured
    pub fn new(config: &SecretsConfig) -> Result<Self> {
        let encoded = config.master_key.as_ref().ok_or_else(|| {
            SecretsError::config(
                "No master key configured. Set FLOWGATE_SECRETS__MASTER_KEY \
                 (generate one with: openssl rand -base64 32)",
            )
        })?;

        let key_bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.expose_secret().trim())
                .map_err(|e| {
                    SecretsError::config(format!("Master key is not valid base64: {}", e))
                })?,
        );

        if key_bytes.len() != 32 {
            return Err(SecretsError::config(format!(
                "Master key must be 32 bytes (256 bits), got {} bytes",
                key_bytes.len()
            )));
        }

        let mut key_array = [0u8; 32];
        key_array.copy_from_slice(&key_bytes);

        Ok(Self::from_key(key_array, &config.key_version))
    }

    /// Create the service from raw key bytes
    pub fn from_key(key: [u8; 32], key_version: &str) -> Self {
        debug!(key_version = %key_version, "Secret encryption service initialized");
        Self {
            key_bytes: Arc::new(Zeroizing::new(key)),
            key_version: key_version.to_string(),
            rng: Arc::new(SystemRandom::new()),
        }
    }

    /// Get the current key version
    pub fn key_version(&self) -> &str {
        &self.key_version
    }

    fn unbound_key(&self) -> Result<UnboundKey> {
        UnboundKey::new(&AES_256_GCM, &self.key_bytes[..]).map_err(|_| {
            error!("Failed to create AES-256-GCM key");
            SecretsError::config("Failed to create AES-256-GCM key")
        })
    }

    /// Encrypt plaintext bound to `binding`
    #[instrument(skip(self, plaintext, binding), fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8], binding: SecretBinding<'_>) -> Result<SealedSecret> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Failed to generate random nonce");
            SecretsError::config("Failed to generate random nonce for encryption")
        })?;

        let mut sealing_key =
            aead::SealingKey::new(self.unbound_key()?, SingleNonce::new(nonce_bytes));

        let mut ciphertext = plaintext.to_vec();
        let tag = sealing_key
            .seal_in_place_separate_tag(Aad::from(binding.aad()), &mut ciphertext)
            .map_err(|_| {
                error!("Encryption failed");
                SecretsError::config("Failed to encrypt secret data")
            })?;

        Ok(SealedSecret { ciphertext, iv: nonce_bytes.to_vec(), tag: tag.as_ref().to_vec() })
    }

    /// Decrypt and authenticate a sealed secret.
    ///
    /// Any tag mismatch, whether from tampering, the wrong key or the wrong
    /// binding, is a hard failure.
    #[instrument(skip_all, fields(connector_id = %binding.connector_id, version = binding.version))]
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        tag: &[u8],
        binding: SecretBinding<'_>,
    ) -> Result<SecretString> {
        if iv.len() != NONCE_SIZE {
            return Err(SecretsError::decryption_failed(format!(
                "invalid nonce length: expected {} bytes, got {}",
                NONCE_SIZE,
                iv.len()
            )));
        }

        if tag.len() != TAG_SIZE {
            return Err(SecretsError::decryption_failed(format!(
                "invalid tag length: expected {} bytes, got {}",
                TAG_SIZE,
                tag.len()
            )));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(iv);

        let mut opening_key =
            aead::OpeningKey::new(self.unbound_key()?, SingleNonce::new(nonce_bytes));

        let mut buffer = Zeroizing::new(Vec::with_capacity(ciphertext.len() + TAG_SIZE));
        buffer.extend_from_slice(ciphertext);
        buffer.extend_from_slice(tag);

        let plaintext = opening_key
            .open_in_place(Aad::from(binding.aad()), &mut buffer[..])
            .map_err(|_| {
                error!("Decryption failed - possible tampering, wrong key or wrong binding");
                SecretsError::decryption_failed("authentication failed")
            })?;

        SecretString::from_utf8(plaintext.to_vec())
            .ok_or_else(|| SecretsError::decryption_failed("plaintext is not valid UTF-8"))
    }

    /// Encrypt `plaintext` into a storable record
    pub fn seal_record(
        &self,
        connector_id: &ConnectorId,
        secret_type: SecretType,
        version: u32,
        plaintext: &SecretString,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<StoredSecret> {
        let binding = SecretBinding { connector_id, secret_type, version };
        let sealed = self.encrypt(plaintext.expose_secret().as_bytes(), binding)?;

        Ok(StoredSecret {
            id: SecretId::new(),
            connector_id: connector_id.clone(),
            secret_type,
            ciphertext: sealed.ciphertext,
            iv: sealed.iv,
            tag: sealed.tag,
            version,
            expires_at,
        })
    }

    /// Decrypt a stored record
    pub fn open_record(&self, record: &StoredSecret) -> Result<SecretString> {
        self.decrypt(&record.ciphertext, &record.iv, &record.tag, SecretBinding::of(record))
    }
}

impl std::fmt::Debug for SecretEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretEncryption")
            .field("key_version", &self.key_version)
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_encryption() -> SecretEncryption {
        SecretEncryption::from_key([0x42u8; 32], "test")
    }

    fn binding(id: &ConnectorId) -> SecretBinding<'_> {
        SecretBinding { connector_id: id, secret_type: SecretType::ApiKey, version: 1 }
    }

    fn open(
        encryption: &SecretEncryption,
        sealed: &SealedSecret,
        binding: SecretBinding<'_>,
    ) -> Result<SecretString> {
        encryption.decrypt(&sealed.ciphertext, &sealed.iv, &sealed.tag, binding)
    }

    fn encoded_key(bytes: &[u8]) -> Option<SecretString> {
        Some(SecretString::new(base64::engine::general_purpose::STANDARD.encode(bytes)))
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let encryption = test_encryption();
        let id = ConnectorId::from("c-1");

        let sealed = encryption.encrypt(b"my-secret-token", binding(&id)).unwrap();
        assert_eq!(sealed.iv.len(), NONCE_SIZE);
        assert_eq!(sealed.tag.len(), TAG_SIZE);
        assert_eq!(sealed.ciphertext.len(), b"my-secret-token".len());

        let plaintext = open(&encryption, &sealed, binding(&id)).unwrap();
        assert_eq!(plaintext.expose_secret(), "my-secret-token");
    }

    #[test]
    fn test_different_nonces_produce_different_ciphertext() {
        let encryption = test_encryption();
        let id = ConnectorId::from("c-1");

        let a = encryption.encrypt(b"same-plaintext", binding(&id)).unwrap();
        let b = encryption.encrypt(b"same-plaintext", binding(&id)).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let encryption = test_encryption();
        let id = ConnectorId::from("c-1");

        let mut sealed = encryption.encrypt(b"sensitive-data", binding(&id)).unwrap();
        sealed.ciphertext[0] ^= 0xFF;

        let result = encryption.decrypt(&sealed.ciphertext, &sealed.iv, &sealed.tag, binding(&id));
        assert!(matches!(result, Err(SecretsError::DecryptionFailed { .. })));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let encryption = test_encryption();
        let id = ConnectorId::from("c-1");

        let mut sealed = encryption.encrypt(b"sensitive-data", binding(&id)).unwrap();
        sealed.tag[15] ^= 0x01;

        assert!(open(&encryption, &sealed, binding(&id)).is_err());
    }

    #[test]
    fn test_ciphertext_bound_to_connector_and_version() {
        let encryption = test_encryption();
        let id = ConnectorId::from("c-1");
        let other = ConnectorId::from("c-2");

        let sealed = encryption.encrypt(b"sensitive-data", binding(&id)).unwrap();

        assert!(open(&encryption, &sealed, binding(&other)).is_err());

        let wrong_version = SecretBinding { version: 2, ..binding(&id) };
        assert!(open(&encryption, &sealed, wrong_version).is_err());

        let wrong_type = SecretBinding { secret_type: SecretType::BearerToken, ..binding(&id) };
        assert!(open(&encryption, &sealed, wrong_type).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let id = ConnectorId::from("c-1");
        let sealed = test_encryption().encrypt(b"sensitive-data", binding(&id)).unwrap();

        let other = SecretEncryption::from_key([0x24u8; 32], "other");
        assert!(open(&other, &sealed, binding(&id)).is_err());
    }

    #[test]
    fn test_invalid_nonce_and_tag_length() {
        let encryption = test_encryption();
        let id = ConnectorId::from("c-1");
        let sealed = encryption.encrypt(b"test", binding(&id)).unwrap();

        let short_iv = encryption.decrypt(&sealed.ciphertext, &[0u8; 8], &sealed.tag, binding(&id));
        assert!(short_iv.is_err());
        let short_tag =
            encryption.decrypt(&sealed.ciphertext, &sealed.iv, &sealed.tag[..8], binding(&id));
        assert!(short_tag.is_err());
    }

    #[test]
    fn test_record_roundtrip() {
        let encryption = test_encryption();
        let id = ConnectorId::from("c-1");

        let record = encryption
            .seal_record(&id, SecretType::BasicPassword, 3, &SecretString::new("hunter2"), None)
            .unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(encryption.open_record(&record).unwrap().expose_secret(), "hunter2");
    }

    #[test]
    fn test_new_from_config() {
        let config = SecretsConfig {
            master_key: encoded_key(&[7u8; 32]),
            key_version: "v2".to_string(),
        };
        let encryption = SecretEncryption::new(&config).unwrap();
        assert_eq!(encryption.key_version(), "v2");
    }

    #[test]
    fn test_invalid_key_configuration() {
        let missing = SecretsConfig::default();
        assert!(matches!(SecretEncryption::new(&missing), Err(SecretsError::ConfigError { .. })));

        let short = SecretsConfig {
            master_key: encoded_key(&[0u8; 16]),
            key_version: "test".to_string(),
        };
        assert!(SecretEncryption::new(&short).is_err());

        let garbage = SecretsConfig {
            master_key: Some(SecretString::new("not base64!")),
            key_version: "test".to_string(),
        };
        assert!(SecretEncryption::new(&garbage).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", test_encryption());
        assert!(debug.contains("[REDACTED]"));
    }
}
