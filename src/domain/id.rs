//! Domain ID Types with NewType Pattern
//!
//! Type-safe wrappers for gateway identifiers so a connector id can never be
//! passed where a route id is expected. Tenant ids come from the identity
//! middleware and are not required to be UUIDs; the others are generated as
//! UUIDs by the admin surface but are accepted verbatim from the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Macro to generate NewType ID wrappers with all required traits
macro_rules! domain_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from a UUID
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create an ID from an existing string (for store retrieval)
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Create an ID from a string slice
            pub fn from_str_unchecked(s: &str) -> Self {
                Self(s.to_string())
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert to inner string value
            pub fn into_string(self) -> String {
                self.0
            }

            /// Parse and validate a UUID string
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s)?;
                Ok(Self(s.to_string()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

domain_id!(
    /// Identifier of a tenant, as asserted by the identity middleware
    TenantId
);

domain_id!(
    /// Unique identifier for a route
    RouteId
);

domain_id!(
    /// Unique identifier for an upstream connector
    ConnectorId
);

domain_id!(
    /// Unique identifier for a stored secret version
    SecretId
);

domain_id!(
    /// Correlation id propagated to the upstream, audit events and error bodies
    CorrelationId
);
