//! Redacting, zeroizing secret holder.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string that never shows its contents in Debug, Display or serialized
/// output, and whose memory is zeroed on drop.
///
/// - Debug prints `SecretString([REDACTED])`
/// - Display prints `[REDACTED]`
/// - Serialization writes `"[REDACTED]"`; deserialization accepts real values
///   so keys can come from configuration
///
/// The value is only reachable through [`SecretString::expose_secret`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Build from decrypted bytes. The input buffer is zeroed when it is not
    /// valid UTF-8.
    pub fn from_utf8(bytes: Vec<u8>) -> Option<Self> {
        match String::from_utf8(bytes) {
            Ok(s) => Some(Self(s)),
            Err(e) => {
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                None
            }
        }
    }

    /// Never log or print the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretString(value))
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_redacts_debug_and_display() {
        let secret = SecretString::new("super-secret-value");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_secret_string_expose() {
        let secret = SecretString::new("my-secret");
        assert_eq!(secret.expose_secret(), "my-secret");
        assert_eq!(secret.len(), 9);
    }

    #[test]
    fn test_secret_string_serialization_redacts() {
        let secret = SecretString::new("super-secret-value");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_secret_string_deserialization_accepts_values() {
        let secret: SecretString = serde_json::from_str("\"my-actual-secret\"").unwrap();
        assert_eq!(secret.expose_secret(), "my-actual-secret");
    }

    #[test]
    fn test_from_utf8() {
        assert_eq!(SecretString::from_utf8(b"token".to_vec()).unwrap().expose_secret(), "token");
        assert!(SecretString::from_utf8(vec![0xff, 0xfe]).is_none());
    }
}
