//! # HTTP Surface
//!
//! Inbound server for the gateway: a health probe plus a catch-all that
//! feeds every other request into the proxy pipeline.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, HEALTH_PATH};
pub use server::{start_gateway_server, AppState};
