use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether the server is currently waiting for user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    #[default]
    Closed,
    Opened,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFile {
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// Payloads the backend knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    #[serde(rename = "message")]
    Message { message: String },
    #[serde(rename = "state")]
    State { state: ChannelState },
    #[serde(rename = "session_created")]
    SessionCreated { id: i64 },
    #[serde(rename = "end")]
    End,
    #[serde(rename = "dict")]
    Dict { data: Value },
    #[serde(rename = "text-file")]
    TextFile { file: TextFile },
}

impl Payload {
    pub fn message(text: impl Into<String>) -> Self {
        Payload::Message {
            message: text.into(),
        }
    }

    /// Typed view of a raw payload, if it is one of the known shapes.
    pub fn from_json(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// What the channel itself reacts to. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    State(ChannelState),
    SessionCreated(i64),
    End,
    Other,
}

impl PayloadKind {
    pub fn classify(payload: &Value) -> Self {
        let field = |name: &str| payload.get(name).and_then(Value::as_str);

        match field("type") {
            Some("state") => match field("state") {
                Some("opened") => PayloadKind::State(ChannelState::Opened),
                Some("closed") => PayloadKind::State(ChannelState::Closed),
                _ => PayloadKind::Other,
            },
            Some("session_created") => match payload.get("id").and_then(Value::as_i64) {
                Some(id) => PayloadKind::SessionCreated(id),
                None => {
                    log::warn!("session_created payload without a numeric id");
                    PayloadKind::Other
                }
            },
            Some("end") => PayloadKind::End,
            _ => PayloadKind::Other,
        }
    }
}

/// One text frame from the server. Every frame wraps a payload; the other
/// fields describe the persisted message it came from.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub payload: Value,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_system: Option<bool>,
}
