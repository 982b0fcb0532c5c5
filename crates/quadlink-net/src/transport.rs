//! The seam between the coordination core and the REST channel.
//!
//! The reconciler talks to this trait, not to [`crate::ApiClient`] directly,
//! so its concurrency behavior is testable with an in-memory double instead
//! of global mocks.

use async_trait::async_trait;

use quadlink_shared::protocol::{ConversationWire, MessageWire, OutgoingMessage};
use quadlink_shared::Result;

/// Validated attachment bytes ready to travel in a multipart send.
#[derive(Debug, Clone)]
pub struct AttachmentPart {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// The five REST operations of the messaging backend.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// `GET /conversations`, ordered by last_message_time descending.
    async fn list_conversations(&self) -> Result<Vec<ConversationWire>>;

    /// `GET /conversations/{id}`, messages ordered by created_at ascending.
    async fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<MessageWire>>;

    /// `PUT /conversations/{id}/read`, empty body, idempotent.
    async fn mark_read(&self, conversation_id: &str) -> Result<()>;

    /// `POST /messages`, the text-only JSON send.
    async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<MessageWire>;

    /// `POST /messages/upload`, text and attachments in one multipart
    /// request, so their success or failure is atomic.
    async fn send_with_attachments(
        &self,
        outgoing: &OutgoingMessage,
        parts: Vec<AttachmentPart>,
    ) -> Result<MessageWire>;
}
