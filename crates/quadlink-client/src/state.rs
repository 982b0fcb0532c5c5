//! Client state shared across the reconciler and the dispatcher.
//!
//! Wrapped in `Arc<Mutex<>>`; the lock is always released before any network
//! await, so REST calls and push handling never hold it across suspension
//! points.

use std::collections::HashMap;

use uuid::Uuid;

use quadlink_net::AttachmentPart;
use quadlink_shared::protocol::OutgoingMessage;
use quadlink_store::{ConversationStore, ReadStateTracker};

/// A send attempt kept around so a failed message can be retried with the
/// exact same payload (and the same temporary id).
#[derive(Debug, Clone)]
pub struct OutboundDraft {
    pub outgoing: OutgoingMessage,
    pub parts: Vec<AttachmentPart>,
}

/// Central client state.
#[derive(Debug, Default)]
pub struct ClientState {
    /// Conversation registry, message logs, active selection.
    pub store: ConversationStore,

    /// Conversations owing the server a read acknowledgment.
    pub read_state: ReadStateTracker,

    /// In-flight and failed sends, keyed by temporary message id.  Entries
    /// are dropped on confirmation or explicit dismissal.
    pub outbox: HashMap<Uuid, OutboundDraft>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }
}
