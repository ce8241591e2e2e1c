//! Encrypted secret records
//!
//! Secrets are stored only as AES-256-GCM ciphertext. Binary fields are
//! base64 encoded when serialized so records can live in YAML or JSON.

use super::id::{ConnectorId, SecretId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of credential a secret holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    ApiKey,
    BearerToken,
    BasicPassword,
    #[serde(rename = "oauth_client_secret")]
    OAuthClientSecret,
    Custom,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::BearerToken => "bearer_token",
            Self::BasicPassword => "basic_password",
            Self::OAuthClientSecret => "oauth_client_secret",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SecretType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api_key" => Ok(Self::ApiKey),
            "bearer_token" => Ok(Self::BearerToken),
            "basic_password" => Ok(Self::BasicPassword),
            "oauth_client_secret" => Ok(Self::OAuthClientSecret),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown secret type '{}'", other)),
        }
    }
}

/// One stored version of a connector credential
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredSecret {
    pub id: SecretId,
    pub connector_id: ConnectorId,
    pub secret_type: SecretType,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub tag: Vec<u8>,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredSecret {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSecret")
            .field("id", &self.id)
            .field("connector_id", &self.connector_id)
            .field("secret_type", &self.secret_type)
            .field("version", &self.version)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> StoredSecret {
        StoredSecret {
            id: SecretId::from("s-1"),
            connector_id: ConnectorId::from("c-1"),
            secret_type: SecretType::ApiKey,
            ciphertext: vec![1, 2, 3],
            iv: vec![0; 12],
            tag: vec![9; 16],
            version: 1,
            expires_at: None,
        }
    }

    #[test]
    fn binary_fields_are_base64() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["ciphertext"], "AQID");

        let back: StoredSecret = serde_json::from_value(json).unwrap();
        assert_eq!(back.ciphertext, vec![1, 2, 3]);
        assert_eq!(back.tag.len(), 16);
    }

    #[test]
    fn debug_omits_material() {
        let debug = format!("{:?}", record());
        assert!(!debug.contains("ciphertext"));
        assert!(debug.contains("s-1"));
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let mut secret = record();
        assert!(!secret.is_expired_at(now));

        secret.expires_at = Some(now);
        assert!(secret.is_expired_at(now));

        secret.expires_at = Some(now + Duration::seconds(5));
        assert!(!secret.is_expired_at(now));
    }
}
