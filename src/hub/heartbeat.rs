//! Keep-alive and stale-session reaping. Runs only while at least one
//! session is connected; the task handle lives in `HubState` and is
//! aborted when the last session leaves.

use super::SseManager;
use crate::message::{Envelope, EventKind};
use log::info;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(super) fn spawn(hub: &Arc<SseManager>) -> JoinHandle<()> {
    let interval = hub.config.heartbeat_interval;
    let hub = Arc::downgrade(hub);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // interval fires immediately; the first beat belongs one period in
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(hub) = hub.upgrade() else {
                break;
            };
            hub.heartbeat_tick();
        }
    })
}

impl SseManager {
    /// One heartbeat cycle: reap sessions with no successful push inside
    /// the staleness window, then beat the survivors. Sweeping first means
    /// a session reaped at this tick never sees this tick's heartbeat.
    /// This sweep is the only thing that reclaims half-open connections.
    pub(crate) fn heartbeat_tick(&self) {
        let frame = Envelope::new(EventKind::Heartbeat, json!({})).to_frame();
        let mut state = self.lock_state();

        let stale: Vec<String> = state
            .sessions
            .iter()
            .filter(|session| session.last_push.elapsed() > self.config.stale_after)
            .map(|session| session.id.clone())
            .collect();

        for session_id in stale {
            info!("Reaping stale session {session_id}");
            Self::remove_locked(&mut state, &session_id);
        }

        let members = state.channels.global_members();
        self.deliver_locked(&mut state, members, &frame);
    }
}
