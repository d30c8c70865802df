use chrono::Utc;
use serde_json::{Value, json};

/// Discriminator carried in the `type` field of every outbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Connection,
    Init,
    StatusUpdate,
    Heartbeat,
    AnalysisUpdate,
    Log,
    MetricsUpdate,
    TeamUpdate,
    AnalysisMovedToTeam,
    ForceLogout,
    Refresh,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connection => "connection",
            EventKind::Init => "init",
            EventKind::StatusUpdate => "statusUpdate",
            EventKind::Heartbeat => "heartbeat",
            EventKind::AnalysisUpdate => "analysisUpdate",
            EventKind::Log => "log",
            EventKind::MetricsUpdate => "metricsUpdate",
            EventKind::TeamUpdate => "teamUpdate",
            EventKind::AnalysisMovedToTeam => "analysisMovedToTeam",
            EventKind::ForceLogout => "forceLogout",
            EventKind::Refresh => "refresh",
        }
    }
}

/// The one formatting step every outbound message goes through. Nothing is
/// ever written to a transport except a rendered `Envelope`.
#[derive(Clone, Debug)]
pub struct Envelope {
    body: Value,
}

impl Envelope {
    /// Stamps `type` and an ISO-8601 `timestamp` onto the payload fields.
    /// A non-object payload is wrapped under a `data` key.
    pub fn new(kind: EventKind, payload: Value) -> Self {
        let mut body = match payload {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => json!({ "data": other }),
        };

        let fields = body
            .as_object_mut()
            .expect("envelope body is always an object");
        fields.insert("type".to_string(), json!(kind.as_str()));
        fields.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));

        Envelope { body }
    }

    /// Renders the SSE frame: `data: <json>\n\n`.
    pub fn to_frame(&self) -> String {
        format!("data: {}\n\n", self.body)
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}
