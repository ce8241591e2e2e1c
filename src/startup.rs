//! Startup wiring
//!
//! Builds the pipeline from configuration: the SSRF guard, the config store
//! loaded from the bootstrap document, secret decryption, the response cache,
//! the outbound client and the audit sink.

use crate::api::AppState;
use crate::cache::InMemoryResponseCache;
use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::proxy::{GatewayComponents, PipelineSettings, ProxyOrchestrator, ReqwestUpstreamClient};
use crate::secrets::{SecretEncryption, SecretResolver};
use crate::ssrf::SsrfGuard;
use crate::store::{ConfigStore, InMemoryConfigStore, TracingAuditSink};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Load the bootstrap document named in `config`, or start empty
pub async fn load_store(config: &AppConfig, guard: &SsrfGuard) -> Result<InMemoryConfigStore> {
    match config.bootstrap.path.as_deref() {
        Some(path) => {
            let store = InMemoryConfigStore::load_file(Path::new(path), guard).await?;
            info!(
                path,
                routes = store.route_count().await,
                connectors = store.connector_count().await,
                "Loaded bootstrap document"
            );
            Ok(store)
        }
        None => {
            warn!("No bootstrap document configured, gateway starts with no routes");
            Ok(InMemoryConfigStore::new())
        }
    }
}

/// Decryption is optional: without a master key only connectors that need
/// no credentials can be called.
pub fn load_encryption(config: &AppConfig) -> Result<Option<SecretEncryption>> {
    if config.secrets.master_key.is_none() {
        warn!("No master key configured, connector credentials cannot be decrypted");
        return Ok(None);
    }
    SecretEncryption::new(&config.secrets).map(Some).map_err(|e| Error::config(e.to_string()))
}

pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let guard = Arc::new(SsrfGuard::new(config.ssrf.clone()));
    let store: Arc<dyn ConfigStore> = Arc::new(load_store(config, &guard).await?);
    let secrets = SecretResolver::new(store.clone(), load_encryption(config)?);
    let upstream = Arc::new(ReqwestUpstreamClient::with_guard(&config.upstream, guard.clone())?);

    let components = GatewayComponents {
        store,
        guard,
        breakers: Arc::new(CircuitBreakerRegistry::new()),
        secrets,
        cache: Arc::new(InMemoryResponseCache::new(config.cache.capacity)),
        upstream,
        audit: Arc::new(TracingAuditSink),
    };

    let orchestrator = ProxyOrchestrator::new(components, PipelineSettings::from_config(config));
    Ok(AppState::new(Arc::new(orchestrator), config.server.max_body_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn builds_without_bootstrap_or_key() {
        let config = AppConfig::default();
        let state = build_state(&config).await.unwrap();
        assert_eq!(state.max_body_size, config.server.max_body_size);
        assert!(load_encryption(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn bootstrap_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "connectors:\n  - id: c-1\n    tenant_id: acme\n    name: posts\n    \
             base_url: https://93.184.216.34\n\
             routes:\n  - id: r-1\n    tenant_id: acme\n    module: api\n    \
             path_pattern: /posts\n    method: GET\n    \
             upstream_path: /posts\n    connector_id: c-1\n"
        )
        .unwrap();

        let config = AppConfig {
            bootstrap: crate::config::BootstrapConfig {
                path: Some(file.path().to_string_lossy().into_owned()),
            },
            ..Default::default()
        };
        let guard = SsrfGuard::new(config.ssrf.clone());
        let store = load_store(&config, &guard).await.unwrap();
        assert_eq!(store.route_count().await, 1);
        assert_eq!(store.connector_count().await, 1);
    }

    #[tokio::test]
    async fn invalid_master_key_is_config_error() {
        let mut config = AppConfig::default();
        config.secrets.master_key = Some(crate::secrets::SecretString::new("not-base64!"));
        assert!(matches!(load_encryption(&config), Err(Error::Config(_))));
    }
}
