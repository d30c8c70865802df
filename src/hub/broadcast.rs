//! Fan-out primitives. All of them are best-effort and at-most-once: each
//! write is attempted exactly once, a failure removes the failing session
//! and never aborts the loop or reaches the caller. Every primitive
//! returns how many sessions were actually written to.

use super::{HubState, SseManager};
use crate::message::{Envelope, EventKind};
use crate::models::permission::Permission;
use log::warn;
use serde_json::json;

impl SseManager {
    /// Writes one frame to the given sessions, under the state lock.
    /// Failing members are removed from the registry before returning.
    pub(super) fn deliver_locked(
        &self,
        state: &mut HubState,
        session_ids: Vec<String>,
        frame: &str,
    ) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for session_id in session_ids {
            let Some(session) = state.sessions.get_mut(&session_id) else {
                continue;
            };
            match session.transport.send(frame) {
                Ok(()) => {
                    session.touch();
                    delivered += 1;
                }
                Err(error) => {
                    warn!("Dropping session {session_id}: {error}");
                    failed.push(session_id);
                }
            }
        }

        for session_id in failed {
            Self::remove_locked(state, &session_id);
        }

        delivered
    }

    /// Every connected session, via the global channel.
    pub fn broadcast_global(&self, envelope: &Envelope) -> usize {
        let frame = envelope.to_frame();
        let mut state = self.lock_state();
        let members = state.channels.global_members();
        self.deliver_locked(&mut state, members, &frame)
    }

    /// Every session of one user.
    pub fn send_to_user(&self, user_id: &str, envelope: &Envelope) -> usize {
        let frame = envelope.to_frame();
        let mut state = self.lock_state();
        let ids = state.sessions.ids_for_user(user_id);
        self.deliver_locked(&mut state, ids, &frame)
    }

    /// Every session whose role is privileged.
    pub fn broadcast_to_admins(&self, envelope: &Envelope) -> usize {
        let frame = envelope.to_frame();
        let mut state = self.lock_state();
        let ids = state.sessions.admin_ids();
        self.deliver_locked(&mut state, ids, &frame)
    }

    /// Members of one topic channel. Delivery is gated by membership, not
    /// a broadcast-time permission lookup — subscription already was the
    /// permission check. A topic nobody watches delivers to zero sessions.
    pub fn broadcast_topic(&self, topic: &str, envelope: &Envelope) -> usize {
        let frame = envelope.to_frame();
        let mut state = self.lock_state();
        let members = state.channels.topic_members(topic);
        self.deliver_locked(&mut state, members, &frame)
    }

    /// Every session of every user holding `permission` on the resource.
    /// A resource without an id (legacy, ungrouped) falls back to a global
    /// broadcast. An authorization lookup failure is absorbed: logged,
    /// zero deliveries.
    pub async fn broadcast_to_authorized_users(
        &self,
        resource_id: Option<&str>,
        permission: Permission,
        envelope: &Envelope,
    ) -> usize {
        let Some(resource_id) = resource_id else {
            return self.broadcast_global(envelope);
        };

        let users = match self.access.authorized_users(resource_id, permission).await {
            Ok(users) => users,
            Err(error) => {
                warn!("Could not resolve recipients for {resource_id}: {error}");
                return 0;
            }
        };

        let mut delivered = 0;
        for user_id in users {
            delivered += self.send_to_user(&user_id, envelope);
        }
        delivered
    }

    /// `analysisUpdate` to everyone allowed to see the analysis.
    pub async fn notify_analysis_changed(
        &self,
        analysis_id: Option<&str>,
        payload: serde_json::Value,
    ) -> usize {
        let envelope = Envelope::new(EventKind::AnalysisUpdate, payload);
        self.broadcast_to_authorized_users(analysis_id, Permission::ViewAnalysis, &envelope)
            .await
    }

    /// `teamUpdate` to everyone allowed to see the team.
    pub async fn notify_team_changed(
        &self,
        team_id: Option<&str>,
        payload: serde_json::Value,
    ) -> usize {
        let envelope = Envelope::new(EventKind::TeamUpdate, payload);
        self.broadcast_to_authorized_users(team_id, Permission::ViewTeam, &envelope)
            .await
    }

    /// `analysisMovedToTeam` to everyone allowed to see the analysis.
    pub async fn notify_analysis_moved(&self, analysis_id: &str, team_id: &str) -> usize {
        let envelope = Envelope::new(
            EventKind::AnalysisMovedToTeam,
            json!({ "analysisId": analysis_id, "teamId": team_id }),
        );
        self.broadcast_to_authorized_users(Some(analysis_id), Permission::ViewAnalysis, &envelope)
            .await
    }

    /// Admin-only event with a caller-chosen discriminator.
    pub fn notify_admin_event(&self, kind: EventKind, payload: serde_json::Value) -> usize {
        let envelope = Envelope::new(kind, payload);
        self.broadcast_to_admins(&envelope)
    }

    /// One log chunk from a running analysis, to its topic subscribers.
    pub fn publish_analysis_log(&self, analysis_id: &str, chunk: &str) -> usize {
        let envelope = Envelope::new(
            EventKind::Log,
            json!({ "analysisId": analysis_id, "chunk": chunk }),
        );
        self.broadcast_topic(analysis_id, &envelope)
    }
}
