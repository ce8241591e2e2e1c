//! Resolve an inbound method and path to a route and its connector

use super::pattern::{split_path, CompiledPattern};
use crate::domain::{Connector, HttpMethod, ModulePrefix, Route, TenantId};
use crate::store::{ConfigStore, StoreError};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("No route matches {method} {path}")]
    NoRouteFound { method: HttpMethod, path: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Route,
    pub connector: Connector,
    /// Captured path parameters, percent-decoded
    pub params: HashMap<String, String>,
}

struct Candidate {
    route: Route,
    literals: usize,
    params: HashMap<String, String>,
}

/// Priority descending, then most literal segments, then oldest, then id
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.route
        .priority
        .cmp(&a.route.priority)
        .then_with(|| b.literals.cmp(&a.literals))
        .then_with(|| a.route.created_at.cmp(&b.route.created_at))
        .then_with(|| a.route.id.cmp(&b.route.id))
}

/// Split `/module/rest...` into the module prefix and the remaining path
pub fn split_module(path: &str) -> Option<(ModulePrefix, &str)> {
    let trimmed = path.trim_start_matches('/');
    let (first, rest) = match trimmed.find('/') {
        Some(i) => (&trimmed[..i], &trimmed[i..]),
        None => (trimmed, ""),
    };
    let module = first.parse::<ModulePrefix>().ok()?;
    Some((module, rest))
}

#[derive(Clone)]
pub struct RouteMatcher {
    store: Arc<dyn ConfigStore>,
    /// Compiled patterns keyed by their source text
    patterns: Arc<DashMap<String, Arc<CompiledPattern>>>,
}

impl RouteMatcher {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store, patterns: Arc::new(DashMap::new()) }
    }

    /// Number of distinct patterns compiled so far
    pub fn compiled_pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn pattern_for(&self, route: &Route) -> Option<Arc<CompiledPattern>> {
        if let Some(pattern) = self.patterns.get(&route.path_pattern) {
            return Some(pattern.value().clone());
        }
        match CompiledPattern::compile(&route.path_pattern) {
            Ok(pattern) => {
                let pattern = Arc::new(pattern);
                self.patterns.insert(route.path_pattern.clone(), pattern.clone());
                Some(pattern)
            }
            Err(e) => {
                warn!(route_id = %route.id, error = %e, "Skipping route with invalid pattern");
                None
            }
        }
    }

    /// Find the winning route for `method path` within `tenant`.
    ///
    /// `path` includes the module prefix (`/api/posts/1`). Routes whose
    /// connector is missing or inactive are passed over for the next best.
    #[instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn find(
        &self,
        tenant: &TenantId,
        method: HttpMethod,
        path: &str,
    ) -> Result<RouteMatch, RoutingError> {
        let no_route = || RoutingError::NoRouteFound { method, path: path.to_string() };

        let (module, rest) = split_module(path).ok_or_else(no_route)?;
        let segments = split_path(rest).ok_or_else(no_route)?;

        let mut candidates: Vec<Candidate> = self
            .store
            .active_routes(tenant, module)
            .await?
            .into_iter()
            .filter(|route| route.active && route.method == method && &route.tenant_id == tenant)
            .filter_map(|route| {
                let pattern = self.pattern_for(&route)?;
                let params = pattern.matches(&segments)?;
                Some(Candidate { literals: pattern.literal_count(), route, params })
            })
            .collect();

        candidates.sort_by(rank);

        for candidate in candidates {
            match self.store.connector(tenant, &candidate.route.connector_id).await? {
                Some(connector) if connector.active => {
                    debug!(
                        route_id = %candidate.route.id,
                        connector_id = %connector.id,
                        "Route matched"
                    );
                    return Ok(RouteMatch {
                        route: candidate.route,
                        connector,
                        params: candidate.params,
                    });
                }
                Some(_) => {
                    debug!(
                        route_id = %candidate.route.id,
                        "Skipping route with inactive connector"
                    );
                }
                None => {
                    warn!(route_id = %candidate.route.id, "Skipping route with missing connector");
                }
            }
        }

        Err(no_route())
    }
}

impl std::fmt::Debug for RouteMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatcher")
            .field("compiled_patterns", &self.patterns.len())
            .finish_non_exhaustive()
    }
}
