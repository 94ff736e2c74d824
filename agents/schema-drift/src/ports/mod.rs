//! Collaborator ports
//!
//! Traits for everything the orchestrator calls out to: connectors, the
//! semantic-reasoning capability, notification channels and the healer.
//! Every call is made under a caller-supplied timeout by the orchestrator.

mod adapters;

pub use adapters::*;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::contracts::*;

/// Errors returned by collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Collaborator is not reachable or not configured
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Collaborator rejected the request
    #[error("rejected: {0}")]
    Rejected(String),

    /// Collaborator returned something unusable
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Produces an ordered field list for a component.
///
/// Must be deterministic for a static source and return shape metadata only.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connector identifier
    fn id(&self) -> &str;

    /// Whether this connector handles the component kind
    fn supports(&self, kind: ComponentKind) -> bool;

    /// Extract the current schema
    async fn extract_schema(&self, component: &Component) -> CollaboratorResult<Vec<FieldSpec>>;
}

/// Optional enrichment; never gates severity or the decision
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Human-readable explanation of a report
    async fn summarize(&self, report: &DriftReport) -> CollaboratorResult<String>;

    /// Confidence 0-100 in a candidate fix
    async fn score_confidence(&self, action: &HealingAction) -> CollaboratorResult<u8>;
}

/// Notification channel delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: &str, payload: &NotificationPayload) -> CollaboratorResult<DeliveryAck>;
}

/// Applies or queues a healing plan
#[async_trait]
pub trait Healer: Send + Sync {
    async fn heal(&self, request: &HealingRequest) -> CollaboratorResult<HealingOutcome>;
}

/// Picks a connector by component kind, first match wins
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.connectors.iter().map(|c| c.id()).collect::<Vec<_>>())
            .finish()
    }
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connector (builder pattern)
    pub fn with_connector<C: Connector + 'static>(mut self, connector: C) -> Self {
        self.connectors.push(Arc::new(connector));
        self
    }

    /// Add a pre-wrapped connector
    pub fn add_arc_connector(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.push(connector);
    }

    /// Connector for a component kind
    pub fn for_kind(&self, kind: ComponentKind) -> Option<Arc<dyn Connector>> {
        self.connectors.iter().find(|c| c.supports(kind)).cloned()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, ComponentKind);

    #[async_trait]
    impl Connector for Fixed {
        fn id(&self) -> &str {
            self.0
        }

        fn supports(&self, kind: ComponentKind) -> bool {
            kind == self.1
        }

        async fn extract_schema(&self, _component: &Component) -> CollaboratorResult<Vec<FieldSpec>> {
            Ok(vec![FieldSpec::new("id", "int", false, 0)])
        }
    }

    #[test]
    fn test_registry_first_match() {
        let registry = ConnectorRegistry::new()
            .with_connector(Fixed("db-a", ComponentKind::Database))
            .with_connector(Fixed("db-b", ComponentKind::Database))
            .with_connector(Fixed("api", ComponentKind::Api));

        assert_eq!(registry.for_kind(ComponentKind::Database).unwrap().id(), "db-a");
        assert_eq!(registry.for_kind(ComponentKind::Api).unwrap().id(), "api");
        assert!(registry.for_kind(ComponentKind::File).is_none());
    }
}
