//! # Configuration Store and Audit Sink
//!
//! Contracts the pipeline needs from its collaborators. Route, connector and
//! secret definitions are read-only lookups; audit events are fire-and-forget.

pub mod audit;
pub mod memory;

pub use audit::{AuditEvent, AuditOutcome, AuditSink, RecordingAuditSink, TracingAuditSink};
pub use memory::{BootstrapDocument, InMemoryConfigStore};

use crate::domain::{
    Connector, ConnectorId, ModulePrefix, Route, SecretType, StoredSecret, TenantId,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Configuration store unavailable: {0}")]
    Unavailable(String),
}

/// Source of route, connector and secret definitions
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Active routes of `tenant` under `module`, in no particular order
    async fn active_routes(
        &self,
        tenant: &TenantId,
        module: ModulePrefix,
    ) -> Result<Vec<Route>, StoreError>;

    /// A connector owned by `tenant`, whether active or not
    async fn connector(
        &self,
        tenant: &TenantId,
        id: &ConnectorId,
    ) -> Result<Option<Connector>, StoreError>;

    /// Every stored version of a connector's secret of the given type
    async fn secrets(
        &self,
        connector: &ConnectorId,
        secret_type: SecretType,
    ) -> Result<Vec<StoredSecret>, StoreError>;
}
