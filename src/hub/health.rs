//! Process-wide container status, broadcast on change. Lives for the
//! process lifetime and starts in a ready state.

use super::SseManager;
use crate::message::{Envelope, EventKind};
use chrono::{DateTime, Utc};
use serde_json::json;

#[derive(Clone, Debug)]
pub struct ContainerHealth {
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub message: Option<String>,
}

impl Default for ContainerHealth {
    fn default() -> Self {
        ContainerHealth {
            status: "ready".to_string(),
            start_time: Utc::now(),
            message: None,
        }
    }
}

/// Shallow merge into the health record; absent fields keep their value.
#[derive(Clone, Debug, Default)]
pub struct HealthPatch {
    pub status: Option<String>,
    pub message: Option<String>,
}

impl SseManager {
    pub fn health(&self) -> ContainerHealth {
        self.health.lock().expect("Health lock poisoned").clone()
    }

    pub fn set_health(&self, patch: HealthPatch) {
        let mut health = self.health.lock().expect("Health lock poisoned");
        if let Some(status) = patch.status {
            health.status = status;
        }
        if let Some(message) = patch.message {
            health.message = Some(message);
        }
    }

    /// `set_health` plus a fresh `statusUpdate` to every session.
    pub fn update_health(&self, patch: HealthPatch) -> usize {
        self.set_health(patch);
        self.broadcast_status_update()
    }

    pub fn broadcast_status_update(&self) -> usize {
        let envelope = self.status_envelope();
        self.broadcast_global(&envelope)
    }

    /// Container health plus aggregate session counts, with uptime
    /// computed at send time.
    pub(crate) fn status_envelope(&self) -> Envelope {
        let health = self.health();
        let stats = self.stats();
        let uptime = (Utc::now() - health.start_time).num_seconds();

        Envelope::new(
            EventKind::StatusUpdate,
            json!({
                "status": health.status,
                "startTime": health.start_time.to_rfc3339(),
                "uptimeSeconds": uptime,
                "message": health.message,
                "sessions": {
                    "totalSessions": stats.total_sessions,
                    "uniqueUsers": stats.unique_users,
                },
            }),
        )
    }
}
