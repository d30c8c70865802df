//! Seams to the subsystems the hub depends on but does not own. Business
//! logic calls into the hub; the hub only ever calls out through these
//! traits, so tests run against fakes and the real wiring lives in the
//! surrounding platform.

use crate::errors::{auth_error::AuthError, service_error::ServiceError};
use crate::models::{
    identity::Identity, metrics::AggregateMetrics, permission::Permission, snapshot::SnapshotData,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashSet;

/// Turns an inbound request into a verified identity. Owned by the
/// authentication subsystem; a failure here never reaches the registries.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError>;
}

/// Authoritative identity lookup. Consulted again on every snapshot so a
/// role revoked after connect never leaks a stale view.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn fetch_identity(&self, user_id: &str) -> Result<Identity, ServiceError>;
}

/// Permission queries against the relational role/permission schema.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Ids of the resources `user_id` holds `permission` on.
    async fn accessible_ids(
        &self,
        user_id: &str,
        permission: Permission,
    ) -> Result<HashSet<String>, ServiceError>;

    /// Users holding `permission` on one resource.
    async fn authorized_users(
        &self,
        resource_id: &str,
        permission: Permission,
    ) -> Result<HashSet<String>, ServiceError>;

    /// Whether `user_id` may subscribe to a topic's event stream.
    async fn can_subscribe(&self, user_id: &str, topic: &str) -> bool;
}

/// Current business-data snapshot from the data subsystem.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn full_snapshot(&self) -> Result<SnapshotData, ServiceError>;
}

/// Aggregate process metrics from the supervision subsystem.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn aggregate(&self) -> Result<AggregateMetrics, ServiceError>;
}
