//! Permission-filtered initial state, sent on connect and on demand.
//! The user's role is re-fetched from the authoritative store every time;
//! trusting the role cached at connect time would leak a since-revoked
//! view. Any fetch failure keeps the connection open on its stale view.

use super::SseManager;
use crate::message::{Envelope, EventKind};
use crate::models::permission::Permission;
use crate::models::snapshot::ResourceRecord;
use log::warn;
use serde_json::{Value, json};
use std::collections::HashSet;

impl SseManager {
    /// Builds and pushes `init` followed by `statusUpdate` to one session.
    pub async fn send_initial_snapshot(&self, session_id: &str) {
        let user_id = {
            let state = self.lock_state();
            match state.sessions.get(session_id) {
                Some(session) => session.user_id.clone(),
                None => return,
            }
        };

        let identity = match self.identity.fetch_identity(&user_id).await {
            Ok(identity) => identity,
            Err(error) => {
                warn!("Keeping stale view for user {user_id}: could not refresh identity: {error}");
                return;
            }
        };

        let data = match self.snapshots.full_snapshot().await {
            Ok(data) => data,
            Err(error) => {
                warn!("Keeping stale view for user {user_id}: could not fetch snapshot: {error}");
                return;
            }
        };

        let (analyses, teams, team_tree) = if identity.role.is_admin() {
            (data.analyses, data.teams, data.team_tree)
        } else {
            let analysis_ids = match self
                .access
                .accessible_ids(&user_id, Permission::ViewAnalysis)
                .await
            {
                Ok(ids) => ids,
                Err(error) => {
                    warn!("Keeping stale view for user {user_id}: {error}");
                    return;
                }
            };
            let team_ids = match self
                .access
                .accessible_ids(&user_id, Permission::ViewTeam)
                .await
            {
                Ok(ids) => ids,
                Err(error) => {
                    warn!("Keeping stale view for user {user_id}: {error}");
                    return;
                }
            };

            (
                retain_accessible(data.analyses, &analysis_ids),
                retain_accessible(data.teams, &team_ids),
                prune_tree(data.team_tree, &team_ids),
            )
        };

        let init = Envelope::new(
            EventKind::Init,
            json!({
                "analyses": analyses,
                "teams": teams,
                "teamTree": team_tree,
                "user": { "id": identity.user_id, "role": identity.role },
            }),
        );
        let status = self.status_envelope();

        let mut state = self.lock_state();
        // the re-fetched role is now the session's role
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.role = identity.role;
        }
        self.deliver_locked(&mut state, vec![session_id.to_string()], &init.to_frame());
        self.deliver_locked(&mut state, vec![session_id.to_string()], &status.to_frame());
    }

    /// Re-sends the filtered snapshot to every live session of one user,
    /// so clients see corrected data without reconnecting.
    pub async fn refresh_user(&self, user_id: &str) {
        let session_ids = {
            let state = self.lock_state();
            state.sessions.ids_for_user(user_id)
        };

        for session_id in session_ids {
            self.send_initial_snapshot(&session_id).await;
        }
    }
}

fn retain_accessible(
    records: Vec<ResourceRecord>,
    accessible: &HashSet<String>,
) -> Vec<ResourceRecord> {
    records
        .into_iter()
        .filter(|record| accessible.contains(&record.id))
        .collect()
}

/// The folder structure is keyed by team id; keep only accessible teams.
/// Anything unexpectedly non-object passes through untouched.
fn prune_tree(tree: Value, accessible: &HashSet<String>) -> Value {
    match tree {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(team_id, _)| accessible.contains(team_id))
                .collect(),
        ),
        other => other,
    }
}
