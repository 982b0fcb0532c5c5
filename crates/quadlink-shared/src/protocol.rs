//! Wire representations shared by the REST and push channels.
//!
//! Field names mirror the server's JSON exactly (`_id`, snake_case,
//! RFC 3339 timestamps), so the same [`MessageWire`] deserializes from both a
//! REST response body and a `new_message` push frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// A message as the server represents it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageWire {
    /// Server-assigned message id.
    #[serde(rename = "_id")]
    pub id: String,
    /// The conversation this message belongs to.
    pub conversation_id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// May be empty when an attachment is present.
    pub content: String,
    /// Hosted URL of the uploaded attachment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// The "other participant" snapshot cached on each conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantWire {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
}

/// A conversation as returned by `GET /conversations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationWire {
    #[serde(rename = "_id")]
    pub id: String,
    pub participant1_id: UserId,
    pub participant2_id: UserId,
    pub other_participant: ParticipantWire,
    #[serde(default)]
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
}

/// Body of `POST /messages`; also the text fields of the multipart upload.
///
/// `item_id`/`item_type` are the opaque passthrough used when another
/// subsystem seeds a conversation from a listing; the core attaches no
/// meaning to them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub receiver_id: UserId,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
}

/// Frames sent from the client over the push connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Registers this session for push routing. Sent once per connection.
    RegisterUser { user_id: UserId },
}

/// Frames received from the server over the push connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A new message, delivered to both the sender's and the receiver's
    /// registered sessions.
    NewMessage { message: MessageWire },
    /// The other participant read one of this session's sent messages.
    MessageRead { message_id: String },
    /// The other participant read the whole conversation; every message this
    /// session sent into it is now read.
    ConversationRead { conversation_id: String },
    /// Non-fatal server-side error, surfaced as a notification.
    Error { message: String },
}

impl ClientFrame {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ServerFrame {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
