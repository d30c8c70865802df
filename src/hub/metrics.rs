//! Periodic `metricsUpdate` broadcast. The aggregate is fetched once per
//! tick; each recipient then gets totals re-derived from only the
//! analyses they may see, so a member can never infer the size or load of
//! the rest of the platform. Admins get the unfiltered aggregate.

use super::SseManager;
use crate::message::{Envelope, EventKind};
use crate::models::metrics::AggregateMetrics;
use crate::models::permission::Permission;
use log::warn;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(super) fn spawn(hub: &Arc<SseManager>) -> JoinHandle<()> {
    let interval = hub.config.metrics_interval;
    let hub = Arc::downgrade(hub);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(hub) = hub.upgrade() else {
                break;
            };
            hub.broadcast_metrics_update().await;
        }
    })
}

impl SseManager {
    /// One metrics cycle. A metrics-source failure skips the whole tick;
    /// an authorization failure for one user skips only that user.
    pub async fn broadcast_metrics_update(&self) -> usize {
        let aggregate = match self.metrics.aggregate().await {
            Ok(aggregate) => aggregate,
            Err(error) => {
                warn!("Could not fetch aggregate metrics: {error}");
                return 0;
            }
        };

        let users = {
            let state = self.lock_state();
            state.sessions.user_roles()
        };

        let mut delivered = 0;
        for (user_id, role) in users {
            let rows = if role.is_admin() {
                aggregate.analyses.clone()
            } else {
                match self
                    .access
                    .accessible_ids(&user_id, Permission::ViewAnalysis)
                    .await
                {
                    Ok(accessible) => aggregate.restrict(&accessible),
                    Err(error) => {
                        warn!("Skipping metrics for user {user_id}: {error}");
                        continue;
                    }
                }
            };

            let totals = AggregateMetrics::totals(&rows);
            let envelope = Envelope::new(
                EventKind::MetricsUpdate,
                json!({ "analyses": rows, "totals": totals }),
            );
            delivered += self.send_to_user(&user_id, &envelope);
        }

        delivered
    }
}
