use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use quadlink_shared::types::ConversationId;

/// Events surfaced to the UI layer.
///
/// The channel is the only way the core signals the UI; every error reaching
/// a terminal state produces at least one of these, so nothing fails
/// silently.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// The conversation list changed (new preview, new conversation, read
    /// counters).
    ConversationsUpdated,
    /// The message list of one conversation changed.
    MessagesUpdated { conversation: ConversationId },
    /// A send attempt reached `Failed`; the message stays visible with a
    /// retry affordance.
    MessageFailed {
        conversation: ConversationId,
        temp_id: Uuid,
        reason: String,
    },
    /// Push connection went up or down.  REST paths keep working either way.
    SocketStatus { connected: bool },
    /// A visible, non-fatal error (auth prompt, push-channel server error).
    Error { message: String },
}

/// Cloneable handle used by the core to emit [`UiEvent`]s.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<UiEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<UiEvent>) -> Self {
        Self { tx }
    }

    /// Emit without blocking.  A full channel means the UI is hopelessly
    /// behind; the event is dropped with a log line rather than stalling a
    /// network task.
    pub fn emit(&self, event: UiEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!(error = %e, "Failed to emit UI event");
        }
    }
}
