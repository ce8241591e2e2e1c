//! In-memory configuration store, loaded from a bootstrap YAML document

use super::{ConfigStore, StoreError};
use crate::domain::{
    Connector, ConnectorId, ModulePrefix, Route, SecretType, StoredSecret, TenantId,
    MAX_CACHE_TTL_SECONDS,
};
use crate::errors::{Error, Result};
use crate::routing::{template, CompiledPattern};
use crate::ssrf::SsrfGuard;
use crate::transform::Transform;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tenants' connectors, routes and sealed secrets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapDocument {
    pub connectors: Vec<Connector>,
    pub routes: Vec<Route>,
    pub secrets: Vec<StoredSecret>,
}

impl BootstrapDocument {
    pub fn from_yaml(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let source = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&source)
    }

    /// Check the whole document before anything is admitted.
    ///
    /// Connectors must pass the SSRF guard. Routes must compile (pattern,
    /// upstream template and transforms) and reference a connector of the
    /// same tenant. Secrets must belong to a known connector.
    pub async fn validate(&self, guard: &SsrfGuard) -> Result<()> {
        let mut connectors = HashSet::new();
        for connector in &self.connectors {
            if !connectors.insert((&connector.tenant_id, &connector.id)) {
                return Err(Error::validation(format!("Duplicate connector '{}'", connector.id)));
            }
            connector.validate(guard).await?;
        }

        let mut route_ids = HashSet::new();
        for route in &self.routes {
            if !route_ids.insert(&route.id) {
                return Err(Error::validation(format!("Duplicate route '{}'", route.id)));
            }
            validate_route(route)?;
            if !connectors.contains(&(&route.tenant_id, &route.connector_id)) {
                return Err(Error::validation(format!(
                    "Route '{}' references unknown connector '{}' for tenant '{}'",
                    route.id, route.connector_id, route.tenant_id
                )));
            }
        }

        let connector_ids: HashSet<&ConnectorId> = self.connectors.iter().map(|c| &c.id).collect();
        for secret in &self.secrets {
            if !connector_ids.contains(&secret.connector_id) {
                return Err(Error::validation(format!(
                    "Secret '{}' references unknown connector '{}'",
                    secret.id, secret.connector_id
                )));
            }
        }

        Ok(())
    }
}

fn validate_route(route: &Route) -> Result<()> {
    let pattern = CompiledPattern::compile(&route.path_pattern)
        .map_err(|e| Error::validation(format!("Route '{}': {}", route.id, e)))?;

    let params: HashSet<&str> = pattern.param_names().collect();
    for placeholder in template::placeholders(&route.upstream_path) {
        if !params.contains(placeholder.as_str()) {
            return Err(Error::validation(format!(
                "Route '{}': upstream path uses '{}' which the pattern does not capture",
                route.id, placeholder
            )));
        }
    }

    let legs = [("request", &route.request_transform), ("response", &route.response_transform)];
    for (leg, definition) in legs {
        if let Some(definition) = definition {
            Transform::compile(definition).map_err(|e| {
                Error::validation(format!("Route '{}': invalid {} transform: {}", route.id, leg, e))
            })?;
        }
    }

    if route.cache.enabled && route.cache.ttl_seconds == 0 {
        return Err(Error::validation(format!("Route '{}': cache enabled with zero TTL", route.id)));
    }
    if route.cache.ttl_seconds > MAX_CACHE_TTL_SECONDS {
        return Err(Error::validation(format!(
            "Route '{}': cache TTL {}s exceeds the {}s maximum",
            route.id, route.cache.ttl_seconds, MAX_CACHE_TTL_SECONDS
        )));
    }

    Ok(())
}

#[derive(Debug, Default)]
struct Inner {
    routes: Vec<Route>,
    connectors: HashMap<(TenantId, ConnectorId), Connector>,
    secrets: HashMap<ConnectorId, Vec<StoredSecret>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and load a bootstrap document
    pub async fn from_bootstrap(document: BootstrapDocument, guard: &SsrfGuard) -> Result<Self> {
        document.validate(guard).await?;

        let store = Self::new();
        let (connectors, routes, secrets) =
            (document.connectors.len(), document.routes.len(), document.secrets.len());
        for connector in document.connectors {
            store.insert_connector(connector).await;
        }
        for route in document.routes {
            store.insert_route(route).await;
        }
        for secret in document.secrets {
            store.insert_secret(secret).await;
        }

        info!(connectors, routes, secrets, "Loaded bootstrap configuration");
        Ok(store)
    }

    pub async fn load_file(path: &Path, guard: &SsrfGuard) -> Result<Self> {
        let document = BootstrapDocument::from_file(path).await?;
        Self::from_bootstrap(document, guard).await
    }

    /// Insert or replace a route by id
    pub async fn insert_route(&self, route: Route) {
        let mut inner = self.inner.write().await;
        inner.routes.retain(|r| r.id != route.id);
        debug!(route_id = %route.id, pattern = %route.path_pattern, "Stored route");
        inner.routes.push(route);
    }

    pub async fn insert_connector(&self, connector: Connector) {
        let mut inner = self.inner.write().await;
        debug!(connector_id = %connector.id, "Stored connector");
        inner.connectors.insert((connector.tenant_id.clone(), connector.id.clone()), connector);
    }

    /// Add a secret version; an existing record with the same version is replaced
    pub async fn insert_secret(&self, secret: StoredSecret) {
        let mut inner = self.inner.write().await;
        let versions = inner.secrets.entry(secret.connector_id.clone()).or_default();
        versions.retain(|s| !(s.secret_type == secret.secret_type && s.version == secret.version));
        versions.push(secret);
    }

    pub async fn route_count(&self) -> usize {
        self.inner.read().await.routes.len()
    }

    pub async fn connector_count(&self) -> usize {
        self.inner.read().await.connectors.len()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn active_routes(
        &self,
        tenant: &TenantId,
        module: ModulePrefix,
    ) -> std::result::Result<Vec<Route>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .routes
            .iter()
            .filter(|r| r.active && &r.tenant_id == tenant && r.module == module)
            .cloned()
            .collect())
    }

    async fn connector(
        &self,
        tenant: &TenantId,
        id: &ConnectorId,
    ) -> std::result::Result<Option<Connector>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.connectors.get(&(tenant.clone(), id.clone())).cloned())
    }

    async fn secrets(
        &self,
        connector: &ConnectorId,
        secret_type: SecretType,
    ) -> std::result::Result<Vec<StoredSecret>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .secrets
            .get(connector)
            .map(|versions| {
                versions.iter().filter(|s| s.secret_type == secret_type).cloned().collect()
            })
            .unwrap_or_default())
    }
}
