use super::session::Session;
use crate::models::identity::Role;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub total_sessions: usize,
    pub unique_users: usize,
    pub per_user_counts: HashMap<String, usize>,
}

/// All live sessions plus the per-user index. Only ever touched under the
/// hub's state lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    by_user: HashMap<String, HashSet<String>>,
}

impl SessionRegistry {
    pub fn insert(&mut self, session: Session) {
        self.by_user
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.id.clone());
        self.sessions.insert(session.id.clone(), session);
    }

    /// Removes a session and its per-user index entry, dropping the user
    /// entry when it empties. Unknown ids return `None`.
    pub fn remove(&mut self, session_id: &str) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;

        if let Some(ids) = self.by_user.get_mut(&session.user_id) {
            ids.remove(session_id);
            if ids.is_empty() {
                self.by_user.remove(&session.user_id);
            }
        }

        Some(session)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids_for_user(&self, user_id: &str) -> Vec<String> {
        self.by_user
            .get(user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn admin_ids(&self) -> Vec<String> {
        self.sessions
            .values()
            .filter(|session| session.role.is_admin())
            .map(|session| session.id.clone())
            .collect()
    }

    /// Connected users and their roles, one entry per user. A user's role
    /// is the same across all of their sessions.
    pub fn user_roles(&self) -> HashMap<String, Role> {
        self.sessions
            .values()
            .map(|session| (session.user_id.clone(), session.role))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            total_sessions: self.sessions.len(),
            unique_users: self.by_user.len(),
            per_user_counts: self
                .by_user
                .iter()
                .map(|(user, ids)| (user.clone(), ids.len()))
                .collect(),
        }
    }
}
