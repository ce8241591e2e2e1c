//! # Response Cache
//!
//! Stores successful responses of idempotent, cache-enabled routes. The
//! [`ResponseCache`] trait is the seam for alternative stores; the gateway
//! ships with the bounded in-process [`InMemoryResponseCache`].

pub mod memory;

pub use memory::InMemoryResponseCache;

use crate::domain::{HttpMethod, Route};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

/// Deterministic cache key: SHA-256 over the route, method and the values of
/// the route's configured key parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for a request on `route`.
    ///
    /// Key parameters are looked up among captured path parameters first, then
    /// query parameters. A parameter that is absent hashes differently from
    /// one that is present but empty.
    pub fn for_request(
        route: &Route,
        method: HttpMethod,
        path_params: &HashMap<String, String>,
        query_params: &HashMap<String, String>,
    ) -> Self {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, route.tenant_id.as_str().as_bytes());
        update_field(&mut hasher, route.id.as_str().as_bytes());
        update_field(&mut hasher, method.as_str().as_bytes());

        for name in &route.cache.key_params {
            update_field(&mut hasher, name.as_bytes());
            match path_params.get(name).or_else(|| query_params.get(name)) {
                Some(value) => {
                    hasher.update([1u8]);
                    update_field(&mut hasher, value.as_bytes());
                }
                None => hasher.update([0u8]),
            }
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Length-prefixed so adjacent fields cannot run together
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored upstream response. Entries are never mutated once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    /// Allow-listed response headers, already lower-cased
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self { status, headers, body, stored_at: Utc::now() }
    }

    /// Seconds since the entry was stored, for the `Age` header
    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.stored_at).num_seconds().max(0)
    }
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Fetch a live entry. Never returns an entry at or past its expiry.
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedResponse>, CacheError>;

    /// Store or replace an entry that expires after `ttl`
    async fn put(
        &self,
        key: CacheKey,
        entry: CachedResponse,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Number of entries currently held, if the store can report it
    async fn entry_count(&self) -> Option<usize> {
        None
    }
}
