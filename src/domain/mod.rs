//! # Domain Types
//!
//! Plain data shared by every stage of the pipeline. Nothing in this module
//! performs I/O except connector validation, which consults the SSRF guard.

pub mod caller;
pub mod connector;
pub mod id;
pub mod route;
pub mod secret;

pub use caller::{CallerContext, CORRELATION_HEADER, ROLE_HEADER, TENANT_HEADER, USER_HEADER};
pub use connector::{
    AuthSettings, AuthType, BackoffPolicy, CircuitBreakerPolicy, Connector, RetryPolicy,
    DEFAULT_API_KEY_HEADER,
};
pub use id::{ConnectorId, CorrelationId, RouteId, SecretId, TenantId};
pub use route::{CachePolicy, HttpMethod, ModulePrefix, Route, MAX_CACHE_TTL_SECONDS};
pub use secret::{SecretType, StoredSecret};
