//! # Flowgate
//!
//! A multi-tenant API gateway pipeline. Tenants register upstream
//! connectors and routes; each inbound request is matched to a route and
//! forwarded to the connector's upstream with credentials injected, guarded
//! by SSRF checks, per-connector circuit breakers, bounded retries, optional
//! JSON transforms and a response cache.
//!
//! ## Architecture
//!
//! ```text
//! HTTP surface → Route Matcher → Cache → SSRF Guard → Circuit Breaker
//!                                                        ↓
//!      caller ← Transform Engine ← Upstream ← Secret Resolver
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use flowgate::{config::AppConfig, startup, api, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let state = startup::build_state(&config).await?;
//!     api::start_gateway_server(&config.server, state).await
//! }
//! ```

pub mod api;
pub mod cache;
pub mod circuit_breaker;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod secrets;
pub mod ssrf;
pub mod startup;
pub mod store;
pub mod transform;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result};
pub use proxy::{GatewayError, ProxyOrchestrator};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
