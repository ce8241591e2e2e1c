//! Identity of the caller as asserted by upstream middleware

use super::id::{CorrelationId, TenantId};

/// Trusted headers set by the identity middleware
pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub tenant_id: TenantId,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub correlation_id: CorrelationId,
}

impl CallerContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id, user_id: None, role: None, correlation_id: CorrelationId::new() }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, role: Option<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.role = role;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_until_user_attached() {
        let ctx = CallerContext::new(TenantId::from("acme"));
        assert!(ctx.is_anonymous());

        let ctx = ctx.with_user("u-1", Some("editor".to_string()));
        assert!(!ctx.is_anonymous());
        assert_eq!(ctx.role.as_deref(), Some("editor"));
    }
}
