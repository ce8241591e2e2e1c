//! Route domain types
//!
//! A route maps an inbound `(module, method, path)` under a tenant onto a
//! connector and an upstream path template. These are plain data; matching
//! lives in [`crate::routing`].

use super::id::{ConnectorId, RouteId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Fixed allow-list of inbound module prefixes.
///
/// The first inbound path segment selects the module; anything outside this
/// list never reaches route lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulePrefix {
    Api,
    Data,
    Integrations,
    Webhooks,
    Public,
}

impl ModulePrefix {
    pub const ALL: [ModulePrefix; 5] = [
        ModulePrefix::Api,
        ModulePrefix::Data,
        ModulePrefix::Integrations,
        ModulePrefix::Webhooks,
        ModulePrefix::Public,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Data => "data",
            Self::Integrations => "integrations",
            Self::Webhooks => "webhooks",
            Self::Public => "public",
        }
    }
}

impl FromStr for ModulePrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("Unknown module prefix: {}", s))
    }
}

impl fmt::Display for ModulePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP methods a route can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    /// Methods that may be retried automatically on transport failure
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Put | Self::Delete)
    }

    /// Only GET responses are looked up in and written to the cache
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Get)
    }

    pub fn from_http(method: &http::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }

    pub fn to_http(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Head => http::Method::HEAD,
            Self::Post => http::Method::POST,
            Self::Put => http::Method::PUT,
            Self::Patch => http::Method::PATCH,
            Self::Delete => http::Method::DELETE,
            Self::Options => http::Method::OPTIONS,
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(format!("Unsupported HTTP method: {}", s)),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest TTL a route may configure (30 days)
pub const MAX_CACHE_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Per-route response caching policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl_seconds: u64,
    /// Path or query parameter names whose values take part in the cache key
    pub key_params: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self { enabled: false, ttl_seconds: 60, key_params: Vec::new() }
    }
}

impl CachePolicy {
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_seconds.min(MAX_CACHE_TTL_SECONDS))
    }
}

/// A tenant's route definition as supplied by the configuration store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub tenant_id: TenantId,
    pub module: ModulePrefix,
    /// Inbound pattern below the module prefix, e.g. `/posts/:id`
    pub path_pattern: String,
    pub method: HttpMethod,
    /// Upstream path with `:name` or `{name}` placeholders
    pub upstream_path: String,
    pub connector_id: ConnectorId,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub allowed_roles: BTreeSet<String>,
    #[serde(default)]
    pub cache: CachePolicy,
    /// Raw transform document applied to the outbound request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_transform: Option<serde_json::Value>,
    /// Raw transform document applied to the upstream response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_transform: Option<serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Route {
    /// Whether a caller with `role` may use this route.
    ///
    /// An empty allow-list admits any role, including anonymous callers on
    /// routes that do not require authentication.
    pub fn permits_role(&self, role: Option<&str>) -> bool {
        if self.allowed_roles.is_empty() {
            return true;
        }
        role.is_some_and(|r| self.allowed_roles.contains(r))
    }

    /// Whether responses from this route are eligible for caching
    pub fn is_cacheable(&self) -> bool {
        self.cache.enabled && self.cache.ttl_seconds > 0 && self.method.is_cacheable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_yaml() -> &'static str {
        r#"
id: r-1
tenant_id: acme
module: api
path_pattern: /posts/:id
method: GET
upstream_path: /v1/posts/:id
connector_id: c-1
"#
    }

    #[test]
    fn module_prefix_parsing() {
        assert_eq!("webhooks".parse::<ModulePrefix>().unwrap(), ModulePrefix::Webhooks);
        assert!("admin".parse::<ModulePrefix>().is_err());
        assert!("API".parse::<ModulePrefix>().is_err());
    }

    #[test]
    fn idempotent_methods() {
        let idempotent = [
            HttpMethod::Get,
            HttpMethod::Head,
            HttpMethod::Options,
            HttpMethod::Put,
            HttpMethod::Delete,
        ];
        for m in idempotent {
            assert!(m.is_idempotent(), "{} should be idempotent", m);
        }
        assert!(!HttpMethod::Post.is_idempotent());
        assert!(!HttpMethod::Patch.is_idempotent());
    }

    #[test]
    fn method_round_trips_through_http() {
        let m = HttpMethod::from_http(&http::Method::DELETE).unwrap();
        assert_eq!(m, HttpMethod::Delete);
        assert_eq!(m.to_http(), http::Method::DELETE);
        assert!(HttpMethod::from_http(&http::Method::TRACE).is_none());
    }

    #[test]
    fn route_defaults_from_yaml() {
        let route: Route = serde_yaml::from_str(route_yaml()).unwrap();
        assert!(route.active);
        assert!(!route.auth_required);
        assert_eq!(route.priority, 0);
        assert!(!route.cache.enabled);
        assert!(route.request_transform.is_none());
        assert!(!route.is_cacheable());
    }

    #[test]
    fn role_permissions() {
        let mut route: Route = serde_yaml::from_str(route_yaml()).unwrap();
        assert!(route.permits_role(None));

        route.allowed_roles.insert("editor".to_string());
        assert!(route.permits_role(Some("editor")));
        assert!(!route.permits_role(Some("viewer")));
        assert!(!route.permits_role(None));
    }
}
