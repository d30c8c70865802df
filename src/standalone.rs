//! Collaborators for running the hub without the rest of the platform:
//! identity comes from request headers, subscriptions are always allowed,
//! and the data/metrics snapshots are empty. Deployments wire the real
//! subsystems in instead; this exists for local runs and smoke tests.

use crate::errors::{auth_error::AuthError, service_error::ServiceError};
use crate::models::identity::{Identity, Role};
use crate::models::metrics::AggregateMetrics;
use crate::models::permission::Permission;
use crate::models::snapshot::SnapshotData;
use crate::services::{AccessControl, Authenticator, IdentityStore, MetricsSource, SnapshotSource};
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashSet;
use std::env;

pub struct StandaloneDirectory {
    admins: HashSet<String>,
}

impl StandaloneDirectory {
    /// `ADMIN_USERS` is a comma-separated list of user ids granted the
    /// privileged role.
    pub fn from_env() -> Self {
        let admins = env::var("ADMIN_USERS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        StandaloneDirectory { admins }
    }

    fn role_for(&self, user_id: &str) -> Role {
        if self.admins.contains(user_id) {
            Role::Admin
        } else {
            Role::Member
        }
    }
}

#[async_trait]
impl Authenticator for StandaloneDirectory {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let user_id = headers
            .get("x-user-id")
            .ok_or(AuthError::MissingCredentials)?
            .to_str()
            .or(Err(AuthError::InvalidCredentials))?;

        Ok(Identity::new(user_id, self.role_for(user_id)))
    }
}

#[async_trait]
impl IdentityStore for StandaloneDirectory {
    async fn fetch_identity(&self, user_id: &str) -> Result<Identity, ServiceError> {
        Ok(Identity::new(user_id, self.role_for(user_id)))
    }
}

#[async_trait]
impl AccessControl for StandaloneDirectory {
    async fn accessible_ids(
        &self,
        _user_id: &str,
        _permission: Permission,
    ) -> Result<HashSet<String>, ServiceError> {
        Ok(HashSet::new())
    }

    async fn authorized_users(
        &self,
        _resource_id: &str,
        _permission: Permission,
    ) -> Result<HashSet<String>, ServiceError> {
        Ok(self.admins.clone())
    }

    async fn can_subscribe(&self, _user_id: &str, _topic: &str) -> bool {
        true
    }
}

#[async_trait]
impl SnapshotSource for StandaloneDirectory {
    async fn full_snapshot(&self) -> Result<SnapshotData, ServiceError> {
        Ok(SnapshotData::default())
    }
}

#[async_trait]
impl MetricsSource for StandaloneDirectory {
    async fn aggregate(&self) -> Result<AggregateMetrics, ServiceError> {
        Ok(AggregateMetrics::default())
    }
}
