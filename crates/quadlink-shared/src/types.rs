use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = server-issued object id (opaque string)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a conversation.
///
/// A conversation created locally via `get_or_create_conversation` carries a
/// `Local` id until the first confirmed send reveals the server-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConversationId {
    /// Server-assigned id, authoritative.
    Server(String),
    /// Client-side placeholder, valid only until the server id is known.
    Local(Uuid),
}

impl ConversationId {
    pub fn local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// The server id, if this conversation has one.
    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::Server(id) => Some(id),
            Self::Local(_) => None,
        }
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Local(uuid) => write!(f, "local:{uuid}"),
        }
    }
}

/// Identifier of a message.
///
/// An optimistic echo carries a `Temp` id until the server confirms the send;
/// reconciliation matches strictly on this id, never on content heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Server-assigned id, present once the message is confirmed.
    Server(String),
    /// Client-generated temporary id for an unconfirmed optimistic echo.
    Temp(Uuid),
}

impl MessageId {
    pub fn temp() -> Self {
        Self::Temp(Uuid::new_v4())
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::Server(id) => Some(id),
            Self::Temp(_) => None,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Temp(uuid) => write!(f, "temp:{uuid}"),
        }
    }
}

/// Lifecycle tag of an outbound message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Sent optimistically, not yet acknowledged by the server.
    Pending,
    /// Acknowledged by the server; the message carries its server id.
    Confirmed,
    /// The send attempt failed; kept visible with a retry affordance.
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}
