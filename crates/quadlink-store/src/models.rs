//! Domain model structs held in client memory.
//!
//! Every struct derives `Serialize` so it can be handed directly to a UI
//! layer.  Wire conversions live here so the rest of the workspace never
//! touches raw server JSON shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quadlink_shared::protocol::{ConversationWire, MessageWire, ParticipantWire};
use quadlink_shared::types::{ConversationId, DeliveryState, MessageId, UserId};

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// Cached snapshot of "the other participant" in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
}

impl From<ParticipantWire> for Participant {
    fn from(w: ParticipantWire) -> Self {
        Self {
            id: w.id,
            name: w.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A persistent thread between exactly two participants.
///
/// Uniquely identified by its unordered participant pair; created implicitly
/// on first message, mutated on every new message, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    /// The two participants, stored in normalized (sorted) order.
    pub participants: (UserId, UserId),
    pub other_participant: Participant,
    /// Text of the most recent message, for list previews.
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    /// Messages addressed to the session user and not yet read.
    pub unread_count: u32,
}

impl Conversation {
    /// Normalize an unordered participant pair so lookups are orderless.
    pub fn pair_key(a: &UserId, b: &UserId) -> (UserId, UserId) {
        if a.as_str() <= b.as_str() {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }

    pub fn involves(&self, a: &UserId, b: &UserId) -> bool {
        self.participants == Self::pair_key(a, b)
    }

    /// Build from the server's list representation.  The server already
    /// resolves which side of the pair is `other_participant`.
    pub fn from_wire(w: ConversationWire) -> Self {
        Self {
            id: ConversationId::Server(w.id),
            participants: Self::pair_key(&w.participant1_id, &w.participant2_id),
            other_participant: w.other_participant.into(),
            last_message: w.last_message,
            last_message_time: w.last_message_time,
            unread_count: w.unread_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message, optimistic or server-confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// May be empty when an attachment is present.
    pub content: String,
    pub attachment: Option<AttachmentRef>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub delivery_state: DeliveryState,
}

impl Message {
    /// Build from a server representation (REST response or push frame).
    /// Server copies are confirmed by definition.
    pub fn from_wire(w: MessageWire) -> Self {
        let attachment = w.attachment_url.map(AttachmentRef::from_url);
        Self {
            id: MessageId::Server(w.id),
            conversation_id: ConversationId::Server(w.conversation_id),
            sender_id: w.sender_id,
            receiver_id: w.receiver_id,
            content: w.content,
            attachment,
            created_at: w.created_at,
            read: w.read,
            delivery_state: DeliveryState::Confirmed,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.delivery_state == DeliveryState::Confirmed
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// Reference to an attachment bound to a message.
///
/// The local preview handle is available immediately on staging; the hosted
/// URL exists only once the server has confirmed the send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentRef {
    /// In-memory preview handle, usable by the UI before any network call.
    pub preview_handle: Option<Uuid>,
    /// Server-hosted URL, `None` until the send is confirmed.
    pub url: Option<String>,
    pub mime: String,
    pub byte_size: u64,
    pub file_name: String,
}

impl AttachmentRef {
    /// A reference known only by its hosted URL (messages fetched from the
    /// server carry no local preview).
    pub fn from_url(url: String) -> Self {
        Self {
            preview_handle: None,
            url: Some(url),
            mime: String::new(),
            byte_size: 0,
            file_name: String::new(),
        }
    }
}
