//! Wire-level event types.
//!
//! Inbound and outbound events form a closed, tagged set dispatched through
//! [`RelayEngine::handle_event`](crate::engine::RelayEngine::handle_event)
//! rather than open-ended dynamic event names. The JSON representation uses
//! an `event` tag and camelCase field names:
//!
//! ```json
//! {"event": "joinRoom", "room": "lobby"}
//! {"event": "msg", "room": "lobby", "text": "hi"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ConnectionId;

/// Field names the server stamps onto outbound messages.
///
/// Client-supplied values for these are stripped before dispatch and
/// overwritten with server-assigned ones.
const RESERVED_FIELDS: &[&str] = &["socketId", "userId", "timestamp", "event"];

/// User-authored message content.
///
/// `room` targets a specific room; absence means broadcast to every
/// connection. `text` plus arbitrary extra fields make up the payload,
/// which the relay forwards opaquely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Target room; `None` broadcasts to all connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Message text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Arbitrary additional payload fields, forwarded as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageBody {
    /// Create a body carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Create a body targeting a room.
    pub fn room_text(room: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            room: Some(room.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Drop any client-supplied values for server-stamped fields.
    pub(crate) fn strip_reserved(mut self) -> Self {
        for field in RESERVED_FIELDS {
            self.extra.remove(*field);
        }
        self
    }

    /// Short preview of the text for logging (truncated at 80 chars).
    pub fn text_preview(&self) -> String {
        match self.text.as_deref() {
            Some(t) if t.chars().count() > 80 => {
                let head: String = t.chars().take(77).collect();
                format!("{}...", head)
            }
            Some(t) => t.to_string(),
            None => "[no-text]".to_string(),
        }
    }
}

/// Events a client may send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Join a named room (created implicitly on first join)
    JoinRoom { room: String },
    /// Leave a room (no-op success when not a member)
    LeaveRoom { room: String },
    /// Send a message to a room, or to everyone when no room is given
    Msg(MessageBody),
    /// Broadcast an announcement to every connection
    Announce { text: String },
    /// Ask for this connection's own id, identity and room set
    GetInfo,
    /// Liveness check; bypasses routing
    Ping,
}

/// Events the relay delivers to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A relayed user message, stamped with sender id, identity and time
    Msg {
        #[serde(flatten)]
        body: MessageBody,
        socket_id: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        timestamp: i64,
    },
    /// A broadcast announcement, always delivered to every connection
    Announcement {
        text: String,
        socket_id: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        timestamp: i64,
    },
    /// A peer joined a room you are in
    UserJoined {
        socket_id: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        room: String,
        timestamp: i64,
    },
    /// A peer left a room you are in
    UserLeft {
        socket_id: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        room: String,
        timestamp: i64,
    },
    /// A connection closed; broadcast to all remaining connections
    UserDisconnected {
        socket_id: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        reason: String,
        timestamp: i64,
    },
    /// Reply to [`ClientEvent::Ping`]
    Pong { timestamp: i64 },
    /// Reply to [`ClientEvent::GetInfo`]
    SocketInfo {
        id: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        rooms: Vec<String>,
        connected: bool,
    },
    /// Routing receipt: the operation was accepted and routing attempted.
    /// Does not guarantee peer delivery.
    Ack { ok: bool },
}

impl ServerEvent {
    /// The wire name of this event, as it appears in the `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Msg { .. } => "msg",
            Self::Announcement { .. } => "announcement",
            Self::UserJoined { .. } => "userJoined",
            Self::UserLeft { .. } => "userLeft",
            Self::UserDisconnected { .. } => "userDisconnected",
            Self::Pong { .. } => "pong",
            Self::SocketInfo { .. } => "socketInfo",
            Self::Ack { .. } => "ack",
        }
    }
}
