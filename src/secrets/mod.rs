//! # Secret Resolution
//!
//! Connector credentials are stored as AES-256-GCM ciphertext and decrypted
//! only for the duration of a single outbound call.
//!
//! - [`SecretEncryption`] seals and opens records with the master key
//! - [`SecretResolver`] picks the active version and decrypts it
//! - [`SecretString`] keeps plaintext out of logs, debug output and serialized data

pub mod encryption;
pub mod error;
pub mod resolver;
pub mod types;

pub use encryption::{SealedSecret, SecretBinding, SecretEncryption, NONCE_SIZE, TAG_SIZE};
pub use error::{Result, SecretsError};
pub use resolver::SecretResolver;
pub use types::SecretString;
