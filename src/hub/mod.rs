use crate::config::HubConfig;
use crate::errors::hub_error::HubError;
use crate::message::{Envelope, EventKind};
use crate::models::identity::Identity;
use crate::services::{AccessControl, IdentityStore, MetricsSource, SnapshotSource};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

pub mod channel_registry;
pub mod health;
pub mod session;
pub mod session_registry;

mod broadcast;
mod heartbeat;
mod metrics;
mod snapshot;

use channel_registry::ChannelRegistry;
use health::ContainerHealth;
use session::{Session, SessionTransport};
use session_registry::{HubStats, SessionRegistry};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOutcome {
    pub subscribed: Vec<String>,
    pub denied: Vec<String>,
}

/// Everything the registries share. One coarse lock guards it all, so
/// inserts, removals and fan-out iteration are mutually exclusive and
/// writes against one session stay in issue order.
#[derive(Default)]
struct HubState {
    sessions: SessionRegistry,
    channels: ChannelRegistry,
    heartbeat_task: Option<JoinHandle<()>>,
    metrics_task: Option<JoinHandle<()>>,
}

/// The real-time broadcast hub. One instance per process, constructed at
/// startup with the collaborator subsystems injected; business logic calls
/// the `notify_*` surface after each mutation, never the other way around.
pub struct SseManager {
    config: HubConfig,
    identity: Arc<dyn IdentityStore>,
    access: Arc<dyn AccessControl>,
    snapshots: Arc<dyn SnapshotSource>,
    metrics: Arc<dyn MetricsSource>,
    state: Mutex<HubState>,
    health: Mutex<ContainerHealth>,
}

impl SseManager {
    pub fn new(
        config: HubConfig,
        identity: Arc<dyn IdentityStore>,
        access: Arc<dyn AccessControl>,
        snapshots: Arc<dyn SnapshotSource>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Arc<Self> {
        Arc::new(SseManager {
            config,
            identity,
            access,
            snapshots,
            metrics,
            state: Mutex::new(HubState::default()),
            health: Mutex::new(ContainerHealth::default()),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().expect("Hub state lock poisoned")
    }

    /// Registers a new connection: allocates an id, joins the global
    /// channel, pushes the `connection` envelope carrying the session id.
    /// The first session to arrive starts the heartbeat and metrics tasks.
    /// Returns the receiver that feeds the client's response body.
    pub fn add_session(self: &Arc<Self>, identity: Identity) -> (String, UnboundedReceiver<String>) {
        let (transport, rx) = SessionTransport::channel();
        let session_id = guid_create::GUID::rand().to_string().to_lowercase();
        let session = Session::new(session_id.clone(), identity, transport);

        let mut state = self.lock_state();
        let was_empty = state.sessions.is_empty();

        info!("Session {session_id} connected for user {}", session.user_id);
        state.sessions.insert(session);
        state.channels.join_global(&session_id);

        let frame =
            Envelope::new(EventKind::Connection, json!({ "sessionId": session_id })).to_frame();
        if let Some(session) = state.sessions.get_mut(&session_id) {
            if session.transport.send(&frame).is_ok() {
                session.touch();
            }
        }

        if was_empty {
            info!("First session connected, starting background tasks");
            state.heartbeat_task = Some(heartbeat::spawn(self));
            state.metrics_task = Some(metrics::spawn(self));
        }

        (session_id, rx)
    }

    /// Tears a session down: out of every channel, out of the per-user
    /// index, out of the global set. Removing an unknown id is a no-op.
    /// The last session to leave stops the background tasks.
    pub fn remove_session(&self, session_id: &str) -> bool {
        let mut state = self.lock_state();
        Self::remove_locked(&mut state, session_id)
    }

    fn remove_locked(state: &mut HubState, session_id: &str) -> bool {
        let Some(session) = state.sessions.remove(session_id) else {
            return false;
        };
        state.channels.leave_all(session_id);
        info!("Session {session_id} closed for user {}", session.user_id);

        if state.sessions.is_empty() {
            info!("Last session closed, stopping background tasks");
            if let Some(task) = state.heartbeat_task.take() {
                task.abort();
            }
            if let Some(task) = state.metrics_task.take() {
                task.abort();
            }
        }

        true
    }

    /// Opts a session into topic channels. Already-held topics are
    /// reported as subscribed without a new authorization check; the rest
    /// are checked one by one so a denial only lands in `denied` and the
    /// remaining topics still go through.
    pub async fn subscribe(
        &self,
        session_id: &str,
        topics: Vec<String>,
    ) -> Result<SubscriptionOutcome, HubError> {
        let (user_id, mut subscribed, pending) = {
            let state = self.lock_state();
            let session = state
                .sessions
                .get(session_id)
                .ok_or_else(|| HubError::UnknownSession(session_id.to_string()))?;

            let mut seen = HashSet::new();
            let mut already = Vec::new();
            let mut pending = Vec::new();
            for topic in topics {
                if !seen.insert(topic.clone()) {
                    continue;
                }
                if session.subscribed_topics.contains(&topic) {
                    already.push(topic);
                } else {
                    pending.push(topic);
                }
            }
            (session.user_id.clone(), already, pending)
        };

        let mut approved = Vec::new();
        let mut denied = Vec::new();
        for topic in pending {
            if self.access.can_subscribe(&user_id, &topic).await {
                approved.push(topic);
            } else {
                denied.push(topic);
            }
        }

        let mut state = self.lock_state();
        let HubState {
            sessions, channels, ..
        } = &mut *state;
        let Some(session) = sessions.get_mut(session_id) else {
            return Err(HubError::UnknownSession(session_id.to_string()));
        };
        for topic in approved {
            if session.subscribed_topics.insert(topic.clone()) {
                channels.subscribe(&topic, session_id);
            }
            subscribed.push(topic);
        }

        Ok(SubscriptionOutcome { subscribed, denied })
    }

    /// Drops topic memberships; a topic channel left empty is deleted.
    /// Returns the topics that were actually dropped.
    pub fn unsubscribe(
        &self,
        session_id: &str,
        topics: Vec<String>,
    ) -> Result<Vec<String>, HubError> {
        let mut state = self.lock_state();
        let HubState {
            sessions, channels, ..
        } = &mut *state;
        let Some(session) = sessions.get_mut(session_id) else {
            return Err(HubError::UnknownSession(session_id.to_string()));
        };

        let mut unsubscribed = Vec::new();
        for topic in topics {
            if session.subscribed_topics.remove(&topic) {
                channels.unsubscribe(&topic, session_id);
                unsubscribed.push(topic);
            }
        }

        Ok(unsubscribed)
    }

    pub fn stats(&self) -> HubStats {
        self.lock_state().sessions.stats()
    }

    /// Tells every connected session of this user to re-authenticate and
    /// then force-closes them once the message has had a chance to flush.
    pub fn force_disconnect_user(self: &Arc<Self>, user_id: &str, reason: &str) {
        let frame = Envelope::new(EventKind::ForceLogout, json!({ "reason": reason })).to_frame();

        let ids = {
            let mut state = self.lock_state();
            let ids = state.sessions.ids_for_user(user_id);
            self.deliver_locked(&mut state, ids.clone(), &frame);
            ids
        };

        if ids.is_empty() {
            return;
        }

        warn!("Forcing logout of user {user_id}: {reason}");
        let hub = Arc::clone(self);
        let grace = self.config.logout_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            for id in ids {
                hub.remove_session(&id);
            }
        });
    }

    /// Disconnects every session and stops the background tasks. The
    /// instance stays usable; the next connection restarts the timers.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        let ids: Vec<String> = state
            .sessions
            .iter()
            .map(|session| session.id.clone())
            .collect();
        for session_id in ids {
            Self::remove_locked(&mut state, &session_id);
        }
    }

    /// Pushes a `refresh` hint and re-sends the filtered snapshot to every
    /// session of this user. Called after out-of-band role or team edits.
    pub async fn notify_user_permissions_changed(&self, user_id: &str) {
        let envelope = Envelope::new(EventKind::Refresh, json!({}));
        self.send_to_user(user_id, &envelope);
        self.refresh_user(user_id).await;
    }
}
