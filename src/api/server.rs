use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::Error;
use crate::proxy::ProxyOrchestrator;

use super::routes::build_router;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<ProxyOrchestrator>,
    pub max_body_size: usize,
}

impl AppState {
    pub fn new(orchestrator: Arc<ProxyOrchestrator>, max_body_size: usize) -> Self {
        Self { orchestrator, max_body_size }
    }
}

pub async fn start_gateway_server(config: &ServerConfig, state: AppState) -> crate::Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid gateway address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind gateway server: {}", e)))?;

    info!(address = %addr, "Starting gateway HTTP server");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Gateway shutdown listener failed");
            }
        })
        .await
        .map_err(|e| Error::transport(format!("Gateway server error: {}", e)))?;

    info!("Gateway server shutdown completed");
    Ok(())
}
