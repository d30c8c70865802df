use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Identity attached to a connection by the authentication subsystem.
/// `context` is whatever extra claims the authenticator resolved; the hub
/// carries it opaquely and never inspects it.
#[derive(Clone, Debug)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
    pub context: Value,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Identity {
            user_id: user_id.into(),
            role,
            context: Value::Null,
        }
    }
}
