//! # Proxy Pipeline
//!
//! Turns an authenticated inbound request into an outbound call to a
//! tenant's upstream connector and relays the result.

pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod upstream;

pub use credentials::CredentialInjector;
pub use error::GatewayError;
pub use orchestrator::{
    CacheStatus, GatewayComponents, PipelineSettings, ProxyOrchestrator, ProxyRequest,
    ProxyResponse, CACHE_STATUS_HEADER,
};
pub use retry::calculate_backoff;
pub use upstream::{
    ReqwestUpstreamClient, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse,
};
