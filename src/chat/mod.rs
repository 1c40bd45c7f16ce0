pub mod channel;
pub mod payload;

use std::fmt;
use thiserror::Error;

pub use channel::{ChannelHandlers, FrameSink, PayloadChannel};
pub use payload::{ChannelState, InboundFrame, Payload, PayloadKind, TextFile};

/// Sentinel id asking the server to create a fresh session.
pub const NEW_SESSION_ID: i64 = -1;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Invalid chat URL: {0}")]
    InvalidUrl(String),
    #[error("Connection failed: {0}")]
    ConnectionError(String),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Socket is gone")]
    SocketClosed,
}

/// Which chat session a channel talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRef {
    New,
    Existing(i64),
}

impl SessionRef {
    /// Route-style identifier: anything starting with `new` is a new session.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.starts_with("new") {
            return Some(SessionRef::New);
        }
        raw.trim().parse::<i64>().ok().map(SessionRef::Existing)
    }

    pub fn wire_id(&self) -> i64 {
        match self {
            SessionRef::New => NEW_SESSION_ID,
            SessionRef::Existing(id) => *id,
        }
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_id())
    }
}
