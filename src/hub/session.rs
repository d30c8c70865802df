use crate::errors::transport_error::TransportError;
use crate::models::identity::{Identity, Role};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Write side of one client's event stream. Owned exclusively by the
/// session; the paired receiver feeds the HTTP response body. Sends never
/// block; a send against a hung-up client fails immediately.
#[derive(Debug)]
pub struct SessionTransport {
    tx: UnboundedSender<String>,
}

impl SessionTransport {
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        (SessionTransport { tx }, rx)
    }

    pub fn send(&self, frame: &str) -> Result<(), TransportError> {
        self.tx
            .send(frame.to_string())
            .map_err(|_| TransportError::Closed)
    }
}

/// One live client connection: identity as resolved at connect time plus
/// the topics it has opted into. Exactly one per physical connection.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub auth_context: Value,
    pub subscribed_topics: HashSet<String>,
    pub last_push: Instant,
    pub transport: SessionTransport,
}

impl Session {
    pub fn new(id: String, identity: Identity, transport: SessionTransport) -> Self {
        Session {
            id,
            user_id: identity.user_id,
            role: identity.role,
            auth_context: identity.context,
            subscribed_topics: HashSet::new(),
            last_push: Instant::now(),
            transport,
        }
    }

    /// Marks a successful push, resetting the staleness window.
    pub fn touch(&mut self) {
        self.last_push = Instant::now();
    }
}
