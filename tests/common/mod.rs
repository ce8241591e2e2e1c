//! Shared harness for integration tests.
//!
//! Builds a full pipeline over an in-memory store loaded from a bootstrap
//! YAML document, with a guard that admits loopback so wiremock servers can
//! stand in for upstreams.

#![allow(dead_code)]

use flowgate::api::{build_router, AppState};
use flowgate::cache::InMemoryResponseCache;
use flowgate::circuit_breaker::CircuitBreakerRegistry;
use flowgate::domain::{ConnectorId, SecretType};
use flowgate::proxy::{
    GatewayComponents, PipelineSettings, ProxyOrchestrator, ReqwestUpstreamClient,
};
use flowgate::secrets::{SecretEncryption, SecretResolver, SecretString};
use flowgate::ssrf::{IpCidr, SsrfConfig, SsrfGuard};
use flowgate::store::{BootstrapDocument, ConfigStore, InMemoryConfigStore, RecordingAuditSink};
use std::sync::Arc;
use std::time::Duration;

pub const MASTER_KEY: [u8; 32] = [7u8; 32];

pub fn encryption() -> SecretEncryption {
    SecretEncryption::from_key(MASTER_KEY, "test")
}

/// Default policy minus the loopback block
pub fn loopback_guard() -> Arc<SsrfGuard> {
    let config = SsrfConfig {
        blocked_cidrs: SsrfConfig::default()
            .blocked_cidrs
            .into_iter()
            .filter(|c| c.to_string() != "127.0.0.0/8")
            .collect::<Vec<IpCidr>>(),
        ..Default::default()
    };
    Arc::new(SsrfGuard::new(config))
}

pub struct TestGateway {
    pub orchestrator: Arc<ProxyOrchestrator>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub store: InMemoryConfigStore,
    pub audit: RecordingAuditSink,
    pub state: AppState,
}

impl TestGateway {
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Seal and store a credential for `connector_id`
    pub async fn add_secret(&self, connector_id: &str, secret_type: SecretType, value: &str) {
        let record = encryption()
            .seal_record(
                &ConnectorId::from(connector_id),
                secret_type,
                1,
                &SecretString::new(value),
                None,
            )
            .unwrap();
        self.store.insert_secret(record).await;
    }
}

pub async fn gateway(bootstrap_yaml: &str) -> TestGateway {
    let settings =
        PipelineSettings { request_deadline: Duration::from_secs(10), ..Default::default() };
    gateway_with(bootstrap_yaml, settings).await
}

pub async fn gateway_with(bootstrap_yaml: &str, settings: PipelineSettings) -> TestGateway {
    let guard = loopback_guard();
    let document = BootstrapDocument::from_yaml(bootstrap_yaml).unwrap();
    let store = InMemoryConfigStore::from_bootstrap(document, &guard).await.unwrap();
    let shared: Arc<dyn ConfigStore> = Arc::new(store.clone());

    let breakers = Arc::new(CircuitBreakerRegistry::new());
    let audit = RecordingAuditSink::new();
    let components = GatewayComponents {
        store: shared.clone(),
        guard,
        breakers: breakers.clone(),
        secrets: SecretResolver::new(shared, Some(encryption())),
        cache: Arc::new(InMemoryResponseCache::new(64)),
        upstream: Arc::new(ReqwestUpstreamClient::new(&Default::default()).unwrap()),
        audit: Arc::new(audit.clone()),
    };

    let orchestrator = Arc::new(ProxyOrchestrator::new(components, settings));
    let state = AppState::new(orchestrator.clone(), 64 * 1024);
    TestGateway { orchestrator, breakers, store, audit, state }
}

/// A connector entry for tenant `acme` pointing at `base_url`
pub fn connector_yaml(id: &str, base_url: &str, extra: &str) -> String {
    let mut yaml = format!(
        "  - id: {id}\n    tenant_id: acme\n    name: {id}\n    base_url: {base_url}\n"
    );
    for line in extra.lines().filter(|l| !l.trim().is_empty()) {
        yaml.push_str("    ");
        yaml.push_str(line);
        yaml.push('\n');
    }
    yaml
}

/// A route entry for tenant `acme` under the `api` module
pub fn route_yaml(
    id: &str,
    method: &str,
    pattern: &str,
    upstream: &str,
    connector: &str,
    extra: &str,
) -> String {
    let mut yaml = format!(
        "  - id: {id}\n    tenant_id: acme\n    module: api\n    method: {method}\n    \
         path_pattern: {pattern}\n    upstream_path: {upstream}\n    \
         connector_id: {connector}\n"
    );
    for line in extra.lines().filter(|l| !l.trim().is_empty()) {
        yaml.push_str("    ");
        yaml.push_str(line);
        yaml.push('\n');
    }
    yaml
}

pub fn bootstrap(connectors: &[String], routes: &[String]) -> String {
    format!("connectors:\n{}routes:\n{}", connectors.concat(), routes.concat())
}
