//! Read-state bookkeeping for conversations.
//!
//! Local read flags are flipped optimistically by the store operations; this
//! tracker only remembers which conversations still owe the server a
//! `PUT /conversations/{id}/read` acknowledgment.  A failed ack never rolls
//! back local state; the conversation simply stays in the pending set and is
//! retried on the next state-changing event.

use std::collections::HashSet;

use tracing::debug;

use quadlink_shared::types::ConversationId;

#[derive(Debug, Default)]
pub struct ReadStateTracker {
    pending_acks: HashSet<ConversationId>,
}

impl ReadStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` was marked read locally and owes a server ack.
    /// Idempotent: repeated marks with no intervening message are one entry.
    pub fn note_read(&mut self, id: ConversationId) {
        if self.pending_acks.insert(id.clone()) {
            debug!(conversation = %id, "Read mark queued for server ack");
        }
    }

    /// Drain every conversation that still owes an ack.  The caller attempts
    /// the acks and feeds failures back via [`ack_failed`].
    ///
    /// [`ack_failed`]: Self::ack_failed
    pub fn take_pending_acks(&mut self) -> Vec<ConversationId> {
        self.pending_acks.drain().collect()
    }

    /// Re-queue a conversation whose server ack failed.
    pub fn ack_failed(&mut self, id: ConversationId) {
        debug!(conversation = %id, "Read ack failed, will retry");
        self.pending_acks.insert(id);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_acks.is_empty()
    }

    /// Conversations still owing an ack, without draining them.
    pub fn pending(&self) -> impl Iterator<Item = &ConversationId> {
        self.pending_acks.iter()
    }

    /// Re-key a pending ack after a local placeholder adopted its server id.
    pub fn rename(&mut self, old: &ConversationId, new: ConversationId) {
        if self.pending_acks.remove(old) {
            self.pending_acks.insert(new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: &str) -> ConversationId {
        ConversationId::Server(id.into())
    }

    #[test]
    fn test_repeated_marks_collapse_to_one_ack() {
        let mut tracker = ReadStateTracker::new();
        tracker.note_read(c("c1"));
        tracker.note_read(c("c1"));
        tracker.note_read(c("c1"));

        assert_eq!(tracker.take_pending_acks(), vec![c("c1")]);
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_failed_ack_is_retried_later() {
        let mut tracker = ReadStateTracker::new();
        tracker.note_read(c("c1"));

        let pending = tracker.take_pending_acks();
        assert_eq!(pending.len(), 1);

        // Server rejected the ack; local state stays optimistic and the
        // conversation re-enters the pending set.
        tracker.ack_failed(pending.into_iter().next().unwrap());
        assert!(tracker.has_pending());
        assert_eq!(tracker.take_pending_acks(), vec![c("c1")]);
    }
}
