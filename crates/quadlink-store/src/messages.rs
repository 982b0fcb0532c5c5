//! Per-conversation ordered message list and its reconciliation operations.
//!
//! The invariant maintained by every operation: the list is always sorted by
//! `created_at` ascending, regardless of whether an entry arrived via a REST
//! response, a push frame, or an optimistic local send.

use uuid::Uuid;

use quadlink_shared::types::{DeliveryState, MessageId, UserId};

use crate::models::Message;

/// The message list of one conversation.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages, sorted by `created_at` ascending.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains_server_id(&self, server_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.id.server_id() == Some(server_id))
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Append an optimistic echo.  The echo carries a local timestamp which
    /// is almost always the newest entry, but ordered insertion is used so
    /// the sort invariant holds even under clock skew.
    pub fn append_pending(&mut self, message: Message) {
        debug_assert_eq!(message.delivery_state, DeliveryState::Pending);
        self.insert_ordered(message);
    }

    /// Insert a message at the position implied by `created_at` ascending
    /// (not necessarily the tail).  Equal timestamps keep arrival order.
    pub fn insert_ordered(&mut self, message: Message) {
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(pos, message);
    }

    /// Replace the optimistic echo identified by `temp_id` with its
    /// server-confirmed counterpart, in place.
    ///
    /// Matching is strictly by temporary id; content or timestamp heuristics
    /// are ambiguous under duplicate or rapid-fire messages.  Returns `false`
    /// if no echo with that id exists (already confirmed or dismissed).
    pub fn confirm(&mut self, temp_id: Uuid, confirmed: Message) -> bool {
        debug_assert!(confirmed.is_confirmed());
        let Some(idx) = self.index_of_temp(temp_id) else {
            return false;
        };
        // The server copy may already be present via a push echo; keep the
        // authoritative copy once, never twice.
        if let Some(server_id) = confirmed.id.server_id() {
            if self.contains_server_id(server_id) {
                self.messages.remove(idx);
                return true;
            }
        }
        self.messages[idx] = confirmed;
        self.restore_order(idx);
        true
    }

    /// Mark the optimistic echo identified by `temp_id` as failed.  The
    /// message stays visible until explicitly dismissed.
    pub fn mark_failed(&mut self, temp_id: Uuid) -> bool {
        match self.index_of_temp(temp_id) {
            Some(idx) => {
                self.messages[idx].delivery_state = DeliveryState::Failed;
                true
            }
            None => false,
        }
    }

    /// Reset a failed echo to pending ahead of a retry attempt.
    pub fn mark_pending(&mut self, temp_id: Uuid) -> bool {
        match self.index_of_temp(temp_id) {
            Some(idx) => {
                self.messages[idx].delivery_state = DeliveryState::Pending;
                true
            }
            None => false,
        }
    }

    /// Remove a failed echo after the user acknowledged the failure.  Only
    /// failed messages may be dismissed; confirmed history is never removed.
    pub fn dismiss(&mut self, temp_id: Uuid) -> bool {
        match self.index_of_temp(temp_id) {
            Some(idx) if self.messages[idx].delivery_state == DeliveryState::Failed => {
                self.messages.remove(idx);
                true
            }
            _ => false,
        }
    }

    /// Install a freshly fetched server history.
    ///
    /// Confirmed local entries are replaced wholesale by the server list;
    /// unconfirmed optimistic echoes (pending or failed) survive the install
    /// and are re-merged in timestamp order, so a slow history fetch can
    /// never erase an in-flight send.
    pub fn install_history(&mut self, history: Vec<Message>) {
        let unconfirmed: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| !m.is_confirmed())
            .collect();

        self.messages = history;
        self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        // Server history should not contain duplicates, but an interleaved
        // push may already have inserted an entry the fetch also returned.
        self.messages.dedup_by(|a, b| a.id == b.id);

        for msg in unconfirmed {
            self.insert_ordered(msg);
        }
    }

    /// Fold another log into this one, skipping entries whose server id is
    /// already present.  Used when two conversation entries collapse into one.
    pub fn merge_from(&mut self, other: MessageLog) {
        for msg in other.messages {
            if msg
                .id
                .server_id()
                .is_some_and(|sid| self.contains_server_id(sid))
            {
                continue;
            }
            self.insert_ordered(msg);
        }
    }

    /// Flip the read flag on every message addressed to `reader`.  Returns
    /// how many flags actually changed, making repeated calls idempotent.
    pub fn mark_read_for(&mut self, reader: &UserId) -> usize {
        let mut changed = 0;
        for msg in &mut self.messages {
            if !msg.read && &msg.receiver_id == reader {
                msg.read = true;
                changed += 1;
            }
        }
        changed
    }

    /// Flip the read flag on one message, identified by its server id.  Used
    /// when a read receipt names a single message.
    pub fn mark_message_read(&mut self, server_id: &str) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|m| m.id.server_id() == Some(server_id))
        {
            Some(msg) if !msg.read => {
                msg.read = true;
                true
            }
            _ => false,
        }
    }

    /// Flip the read flag on every unread message `sender` put into this
    /// conversation.  Used when the other participant reads the whole
    /// conversation and the server confirms it with a receipt.
    pub fn mark_read_sent_by(&mut self, sender: &UserId) -> usize {
        let mut changed = 0;
        for msg in &mut self.messages {
            if !msg.read && &msg.sender_id == sender {
                msg.read = true;
                changed += 1;
            }
        }
        changed
    }

    fn index_of_temp(&self, temp_id: Uuid) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.id == MessageId::Temp(temp_id))
    }

    /// Re-sort after an in-place replacement whose authoritative timestamp
    /// may have moved the entry.  Stable, so equal timestamps keep position.
    fn restore_order(&mut self, idx: usize) {
        let out_of_order = (idx > 0
            && self.messages[idx - 1].created_at > self.messages[idx].created_at)
            || (idx + 1 < self.messages.len()
                && self.messages[idx].created_at > self.messages[idx + 1].created_at);
        if out_of_order {
            self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
    }
}
