//! The conversation registry and active-selection state.
//!
//! Conversations are keyed by their unordered participant pair.  A
//! conversation that exists only locally (first contact not yet confirmed by
//! the server) carries a [`ConversationId::Local`] placeholder until
//! [`ConversationStore::adopt_server_id`] renames it.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use quadlink_shared::types::{ConversationId, MessageId, UserId};

use crate::messages::MessageLog;
use crate::models::{Conversation, Message, Participant};

/// In-memory registry of conversations and their message logs.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    logs: HashMap<ConversationId, MessageLog>,
    active: Option<ConversationId>,
    /// Bumped on every selection change; history fetches carry the value at
    /// request time so late responses for a stale selection are discarded.
    generation: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Listing / lookup
    // ------------------------------------------------------------------

    /// All conversations, ordered by `last_message_time` descending.
    pub fn list_conversations(&self) -> Vec<&Conversation> {
        let mut out: Vec<&Conversation> = self.conversations.iter().collect();
        out.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        out
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    pub fn find_by_pair(&self, a: &UserId, b: &UserId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.involves(a, b))
    }

    /// The message log of a conversation (empty slice if none exists yet).
    pub fn messages(&self, id: &ConversationId) -> &[Message] {
        self.logs.get(id).map(|l| l.messages()).unwrap_or(&[])
    }

    pub fn log_mut(&mut self, id: &ConversationId) -> &mut MessageLog {
        self.logs.entry(id.clone()).or_default()
    }

    /// The conversation whose log currently holds the optimistic echo with
    /// this temporary id.  Ids may have been adopted since the echo was
    /// appended, so callers resolve through the log rather than remembering
    /// the id they sent to.
    pub fn find_containing_temp(&self, temp_id: Uuid) -> Option<ConversationId> {
        let wanted = MessageId::Temp(temp_id);
        self.logs
            .iter()
            .find(|(_, log)| log.get(&wanted).is_some())
            .map(|(id, _)| id.clone())
    }

    /// The conversation whose log holds the message with this server id.
    /// Read receipts name a message without naming its conversation.
    pub fn find_containing_server(&self, server_id: &str) -> Option<ConversationId> {
        self.logs
            .iter()
            .find(|(_, log)| log.contains_server_id(server_id))
            .map(|(id, _)| id.clone())
    }

    // ------------------------------------------------------------------
    // Selection / staleness
    // ------------------------------------------------------------------

    /// Set the active conversation and return the new selection generation.
    pub fn select(&mut self, id: ConversationId) -> u64 {
        self.active = Some(id);
        self.generation += 1;
        self.generation
    }

    pub fn deselect(&mut self) {
        self.active = None;
        self.generation += 1;
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn is_active(&self, id: &ConversationId) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// Whether a response tagged with `(id, generation)` still belongs to the
    /// current selection.
    pub fn is_current(&self, id: &ConversationId, generation: u64) -> bool {
        self.generation == generation && self.is_active(id)
    }

    // ------------------------------------------------------------------
    // Creation / id adoption
    // ------------------------------------------------------------------

    /// Return the conversation for the unordered pair `(me, other)`, creating
    /// a local placeholder if none exists.
    ///
    /// Keyed by the normalized pair inside one store, so concurrent
    /// first-contact attempts resolve to the same entry.
    pub fn get_or_create_conversation(&mut self, me: &UserId, other: Participant) -> ConversationId {
        if let Some(existing) = self.find_by_pair(me, &other.id) {
            return existing.id.clone();
        }

        let id = ConversationId::local();
        debug!(conversation = %id, other = %other.id, "Creating local conversation placeholder");
        self.conversations.push(Conversation {
            id: id.clone(),
            participants: Conversation::pair_key(me, &other.id),
            other_participant: other,
            last_message: String::new(),
            last_message_time: Utc::now(),
            unread_count: 0,
        });
        self.logs.insert(id.clone(), MessageLog::new());
        id
    }

    /// Rename a local placeholder to its server-assigned id once the first
    /// confirmed send reveals it.
    ///
    /// If a conversation with the server id already exists (both sides made
    /// first contact simultaneously, or a list refresh landed first), the two
    /// entries are collapsed: the server copy wins and the placeholder's
    /// messages are merged into its log.
    pub fn adopt_server_id(&mut self, local: &ConversationId, server_id: String) {
        if !local.is_local() {
            return;
        }
        let server = ConversationId::Server(server_id);

        let Some(local_idx) = self.conversations.iter().position(|c| &c.id == local) else {
            return;
        };

        if self.conversations.iter().any(|c| c.id == server) {
            // Merge: move the placeholder's messages into the server entry.
            let placeholder = self.conversations.remove(local_idx);
            debug!(local = %placeholder.id, server = %server, "Collapsing duplicate conversation");
            if let Some(local_log) = self.logs.remove(&placeholder.id) {
                let target = self.logs.entry(server.clone()).or_default();
                for msg in local_log.messages() {
                    if msg
                        .id
                        .server_id()
                        .is_some_and(|sid| target.contains_server_id(sid))
                    {
                        continue;
                    }
                    let mut moved = msg.clone();
                    moved.conversation_id = server.clone();
                    target.insert_ordered(moved);
                }
            }
        } else {
            self.conversations[local_idx].id = server.clone();
            if let Some(log) = self.logs.remove(local) {
                self.logs.insert(server.clone(), log);
            }
        }

        if self.active.as_ref() == Some(local) {
            self.active = Some(server);
        }
    }

    // ------------------------------------------------------------------
    // Preview / server merge
    // ------------------------------------------------------------------

    /// Upsert the owning conversation's preview from an incoming message.
    ///
    /// The preview only moves forward: an out-of-order push with an older
    /// `created_at` never regresses `last_message`/`last_message_time`.  The
    /// unread count grows when the message was sent by the other participant
    /// and the conversation is not the active selection.
    pub fn apply_incoming_preview(&mut self, message: &Message, me: &UserId) {
        let active = self.is_active(&message.conversation_id);
        let Some(conv) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        else {
            debug!(conversation = %message.conversation_id, "Preview for unknown conversation");
            return;
        };

        if message.created_at > conv.last_message_time {
            conv.last_message = message.content.clone();
            conv.last_message_time = message.created_at;
        }
        if &message.sender_id != me && !active {
            conv.unread_count += 1;
        }
    }

    /// Replace the registry with a fresh server listing.
    ///
    /// Local placeholders with no server counterpart survive the merge, and a
    /// locally newer preview is kept so a concurrent optimistic send is not
    /// regressed by a refresh that raced it.
    pub fn merge_server_conversations(&mut self, fresh: Vec<Conversation>) {
        let mut merged = fresh;

        for existing in &self.conversations {
            match merged.iter_mut().find(|c| c.participants == existing.participants) {
                Some(server_copy) => {
                    if existing.last_message_time > server_copy.last_message_time {
                        server_copy.last_message = existing.last_message.clone();
                        server_copy.last_message_time = existing.last_message_time;
                    }
                    // The server id is authoritative; re-key the local log if
                    // the placeholder had not adopted it yet.
                    if existing.id != server_copy.id {
                        if let Some(log) = self.logs.remove(&existing.id) {
                            self.logs.entry(server_copy.id.clone()).or_default().merge_from(log);
                        }
                        if self.active.as_ref() == Some(&existing.id) {
                            self.active = Some(server_copy.id.clone());
                        }
                    }
                }
                None => merged.push(existing.clone()),
            }
        }

        self.conversations = merged;
    }

    /// Reset the unread counter after a read mark.
    pub fn clear_unread(&mut self, id: &ConversationId) {
        if let Some(conv) = self.conversations.iter_mut().find(|c| &c.id == id) {
            conv.unread_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quadlink_shared::types::{DeliveryState, MessageId};

    fn me() -> UserId {
        UserId::new("me")
    }

    fn other(name: &str) -> Participant {
        Participant {
            id: UserId::new(name),
            name: name.to_string(),
        }
    }

    fn conv(id: &str, a: &str, b: &str, minutes_ago: i64) -> Conversation {
        Conversation {
            id: ConversationId::Server(id.into()),
            participants: Conversation::pair_key(&UserId::new(a), &UserId::new(b)),
            other_participant: other(b),
            last_message: format!("last in {id}"),
            last_message_time: Utc::now() - Duration::minutes(minutes_ago),
            unread_count: 0,
        }
    }

    fn incoming(conversation: &ConversationId, sender: &str, at: chrono::DateTime<Utc>) -> Message {
        Message {
            id: MessageId::Server(format!("m-{sender}-{at}")),
            conversation_id: conversation.clone(),
            sender_id: UserId::new(sender),
            receiver_id: me(),
            content: "ping".into(),
            attachment: None,
            created_at: at,
            read: false,
            delivery_state: DeliveryState::Confirmed,
        }
    }

    #[test]
    fn test_list_is_ordered_by_last_message_time_desc() {
        let mut store = ConversationStore::new();
        store.merge_server_conversations(vec![
            conv("c1", "me", "ann", 30),
            conv("c2", "me", "bob", 5),
            conv("c3", "me", "cal", 60),
        ]);

        let ids: Vec<_> = store
            .list_conversations()
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(ids, vec!["c2", "c1", "c3"]);
    }

    #[test]
    fn test_get_or_create_is_stable_for_unordered_pair() {
        let mut store = ConversationStore::new();
        let first = store.get_or_create_conversation(&me(), other("bob"));
        // Second attempt from "the other direction" finds the same entry.
        let second = store.get_or_create_conversation(&UserId::new("bob"), other("me"));
        assert_eq!(first, second);
        assert_eq!(store.list_conversations().len(), 1);
    }

    #[test]
    fn test_adopt_server_id_renames_placeholder() {
        let mut store = ConversationStore::new();
        let local = store.get_or_create_conversation(&me(), other("bob"));
        let generation = store.select(local.clone());

        store.adopt_server_id(&local, "c9".into());

        let server = ConversationId::Server("c9".into());
        assert!(store.get(&server).is_some());
        assert!(store.get(&local).is_none());
        assert!(store.is_current(&server, generation));
    }

    #[test]
    fn test_adopt_server_id_collapses_duplicates() {
        let mut store = ConversationStore::new();
        let local = store.get_or_create_conversation(&me(), other("bob"));
        let pending = Message {
            id: MessageId::temp(),
            conversation_id: local.clone(),
            sender_id: me(),
            receiver_id: UserId::new("bob"),
            content: "first contact".into(),
            attachment: None,
            created_at: Utc::now(),
            read: false,
            delivery_state: DeliveryState::Pending,
        };
        store.log_mut(&local).append_pending(pending);

        // A list refresh already delivered the server-side conversation.
        let mut fresh = conv("c9", "me", "bob", 0);
        fresh.participants = Conversation::pair_key(&me(), &UserId::new("bob"));
        store.conversations.push(fresh);

        store.adopt_server_id(&local, "c9".into());

        let server = ConversationId::Server("c9".into());
        assert_eq!(store.list_conversations().len(), 1);
        assert_eq!(store.messages(&server).len(), 1);
        assert_eq!(store.messages(&local).len(), 0);
    }

    #[test]
    fn test_preview_never_regresses() {
        let mut store = ConversationStore::new();
        store.merge_server_conversations(vec![conv("c1", "me", "bob", 0)]);
        let id = ConversationId::Server("c1".into());
        let newest = store.get(&id).unwrap().last_message_time;

        // Out-of-order push: older than the current preview.
        let stale = incoming(&id, "bob", newest - Duration::minutes(10));
        store.apply_incoming_preview(&stale, &me());

        let conv = store.get(&id).unwrap();
        assert_eq!(conv.last_message_time, newest);
        assert_ne!(conv.last_message, "ping");
        // Still counted as unread even though the preview kept its value.
        assert_eq!(conv.unread_count, 1);
    }

    #[test]
    fn test_unread_not_bumped_for_active_conversation_or_own_sends() {
        let mut store = ConversationStore::new();
        store.merge_server_conversations(vec![conv("c1", "me", "bob", 10)]);
        let id = ConversationId::Server("c1".into());

        store.select(id.clone());
        let push = incoming(&id, "bob", Utc::now());
        store.apply_incoming_preview(&push, &me());
        assert_eq!(store.get(&id).unwrap().unread_count, 0);

        store.deselect();
        let own = Message {
            sender_id: me(),
            ..incoming(&id, "me", Utc::now())
        };
        store.apply_incoming_preview(&own, &me());
        assert_eq!(store.get(&id).unwrap().unread_count, 0);
    }

    #[test]
    fn test_merge_keeps_local_placeholder_and_newer_preview() {
        let mut store = ConversationStore::new();
        let local = store.get_or_create_conversation(&me(), other("zoe"));

        let mut server_conv = conv("c1", "me", "bob", 1);
        server_conv.last_message = "older server copy".into();
        let mut local_conv = server_conv.clone();
        local_conv.last_message = "optimistic newer".into();
        local_conv.last_message_time = Utc::now();
        store.conversations.push(local_conv);

        store.merge_server_conversations(vec![server_conv]);

        assert!(store.get(&local).is_some(), "placeholder survives refresh");
        let c1 = store.get(&ConversationId::Server("c1".into())).unwrap();
        assert_eq!(c1.last_message, "optimistic newer");
    }

    #[test]
    fn test_staleness_guard_rejects_old_generation() {
        let mut store = ConversationStore::new();
        store.merge_server_conversations(vec![
            conv("a", "me", "ann", 1),
            conv("b", "me", "bob", 2),
        ]);
        let a = ConversationId::Server("a".into());
        let b = ConversationId::Server("b".into());

        // A -> B -> A while A's first fetch is outstanding.
        let gen_a1 = store.select(a.clone());
        let _gen_b = store.select(b.clone());
        let gen_a2 = store.select(a.clone());

        assert!(!store.is_current(&a, gen_a1), "first fetch of A is stale");
        assert!(store.is_current(&a, gen_a2));
    }
}
