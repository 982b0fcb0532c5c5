//! The coordination core: optimistic send, server reconciliation, push-event
//! merge, and read-state synchronization.
//!
//! Two independent delivery channels feed this component: REST responses and
//! push frames.  Every mutation goes through the store operations under one
//! lock, and the lock is never held across a network await, so the two
//! channels can interleave freely while the message order invariant holds at
//! every observation point.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quadlink_net::MessageTransport;
use quadlink_shared::protocol::{MessageWire, OutgoingMessage};
use quadlink_shared::types::{ConversationId, DeliveryState, MessageId};
use quadlink_shared::{ChatError, Result};
use quadlink_store::{Conversation, Message, Participant};

use crate::attachments::{AttachmentUploader, StagedAttachment};
use crate::events::{EventSender, UiEvent};
use crate::session::{ItemContext, SessionContext};
use crate::state::{ClientState, OutboundDraft};

pub struct MessageReconciler<T: MessageTransport> {
    state: Arc<Mutex<ClientState>>,
    transport: Arc<T>,
    session: SessionContext,
    uploader: AttachmentUploader,
    events: EventSender,
}

// Clones share the same state; only the handle is duplicated.
impl<T: MessageTransport> Clone for MessageReconciler<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            transport: self.transport.clone(),
            session: self.session.clone(),
            uploader: self.uploader.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T: MessageTransport + 'static> MessageReconciler<T> {
    pub fn new(
        transport: Arc<T>,
        session: SessionContext,
        uploader: AttachmentUploader,
        events: EventSender,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClientState::new())),
            transport,
            session,
            uploader,
            events,
        }
    }

    pub fn state(&self) -> &Arc<Mutex<ClientState>> {
        &self.state
    }

    pub fn uploader(&self) -> &AttachmentUploader {
        &self.uploader
    }

    // ------------------------------------------------------------------
    // Conversation list / selection
    // ------------------------------------------------------------------

    /// Fetch the conversation list and merge it into the store.
    pub async fn refresh_conversations(&self) -> Result<()> {
        let fresh = self.transport.list_conversations().await?;
        let conversations: Vec<Conversation> =
            fresh.into_iter().map(Conversation::from_wire).collect();
        {
            let mut st = self.state.lock().await;
            let ClientState {
                store, read_state, ..
            } = &mut *st;
            store.merge_server_conversations(conversations);
            // The listing still counts conversations whose read ack is in
            // flight as unread; a refresh must not resurrect a badge the
            // user already cleared.
            for id in read_state.pending() {
                store.clear_unread(id);
            }
        }
        self.events.emit(UiEvent::ConversationsUpdated);
        Ok(())
    }

    /// Refresh the conversation list without blocking the caller.  Used on
    /// the push path so a slow listing cannot stall the dispatcher.
    fn spawn_refresh(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.refresh_conversations().await {
                warn!(error = %e, "Background conversation refresh failed");
            }
        });
    }

    /// Snapshot of the conversation list, newest activity first.
    pub async fn conversations(&self) -> Vec<Conversation> {
        let st = self.state.lock().await;
        st.store.list_conversations().into_iter().cloned().collect()
    }

    /// Snapshot of one conversation's messages, created_at ascending.
    pub async fn messages_of(&self, id: &ConversationId) -> Vec<Message> {
        let st = self.state.lock().await;
        st.store.messages(id).to_vec()
    }

    /// Return the conversation for the session user and `other`, creating a
    /// local placeholder on first contact.
    pub async fn get_or_create_conversation(&self, other: Participant) -> ConversationId {
        let id = {
            let mut st = self.state.lock().await;
            st.store
                .get_or_create_conversation(&self.session.user_id, other)
        };
        self.events.emit(UiEvent::ConversationsUpdated);
        id
    }

    /// Make `id` the active conversation: bump the staleness generation,
    /// mark it read, and fetch its history.
    ///
    /// A history response that resolves after the selection moved on is
    /// discarded; installing it would display the wrong conversation's data.
    pub async fn select_conversation(&self, id: ConversationId) -> Result<()> {
        let (generation, server_id) = {
            let mut st = self.state.lock().await;
            let generation = st.store.select(id.clone());
            self.mark_read_locked(&mut st, &id);
            (generation, id.server_id().map(str::to_string))
        };
        self.events.emit(UiEvent::ConversationsUpdated);

        // Local placeholders have no server history yet.
        if let Some(sid) = server_id {
            match self.transport.conversation_messages(&sid).await {
                Ok(wires) => {
                    let mut st = self.state.lock().await;
                    if st.store.is_current(&id, generation) {
                        let history: Vec<Message> =
                            wires.into_iter().map(Message::from_wire).collect();
                        st.store.log_mut(&id).install_history(history);
                        drop(st);
                        self.events.emit(UiEvent::MessagesUpdated {
                            conversation: id.clone(),
                        });
                    } else {
                        debug!(conversation = %id, "Discarding stale history response");
                    }
                }
                Err(e) => {
                    self.events.emit(UiEvent::Error {
                        message: format!("Failed to load messages: {e}"),
                    });
                    return Err(e);
                }
            }
        }

        self.flush_read_acks().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Send a message with an optimistic local echo.
    ///
    /// Validation failures are returned before any state change or network
    /// call.  Once the echo is appended the method always returns its
    /// temporary id; a transport failure is recorded as
    /// `DeliveryState::Failed` on the echo and surfaced as a
    /// [`UiEvent::MessageFailed`], never by dropping the message.
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        content: &str,
        attachments: Vec<StagedAttachment>,
    ) -> Result<MessageId> {
        self.send_inner(conversation_id, content, attachments, None)
            .await
    }

    /// Send the first message of a conversation seeded from another
    /// subsystem's listing.  The item fields are opaque passthrough.
    pub async fn send_seeded(&self, item: ItemContext) -> Result<MessageId> {
        let other = Participant {
            id: item.receiver_id.clone(),
            name: item.receiver_name.clone(),
        };
        let conversation_id = self.get_or_create_conversation(other).await;
        self.send_inner(
            conversation_id,
            &item.seed_content,
            Vec::new(),
            Some((item.item_id, item.item_type)),
        )
        .await
    }

    async fn send_inner(
        &self,
        conversation_id: ConversationId,
        content: &str,
        attachments: Vec<StagedAttachment>,
        item: Option<(String, String)>,
    ) -> Result<MessageId> {
        let content = content.trim().to_string();
        if content.is_empty() && attachments.is_empty() {
            return Err(ChatError::Validation(
                "a message needs text or an attachment".into(),
            ));
        }
        self.uploader.validate_batch(&attachments)?;

        let temp_id = Uuid::new_v4();
        let (outgoing, parts) = {
            let mut st = self.state.lock().await;
            let conv = st.store.get(&conversation_id).cloned().ok_or_else(|| {
                ChatError::Validation(format!("unknown conversation {conversation_id}"))
            })?;

            let echo = Message {
                id: MessageId::Temp(temp_id),
                conversation_id: conversation_id.clone(),
                sender_id: self.session.user_id.clone(),
                receiver_id: conv.other_participant.id.clone(),
                content: content.clone(),
                attachment: attachments.first().map(|a| a.to_ref()),
                created_at: Utc::now(),
                read: false,
                delivery_state: DeliveryState::Pending,
            };
            st.store.log_mut(&conversation_id).append_pending(echo.clone());
            st.store
                .apply_incoming_preview(&echo, &self.session.user_id);

            let (item_id, item_type) = match item {
                Some((id, ty)) => (Some(id), Some(ty)),
                None => (None, None),
            };
            let outgoing = OutgoingMessage {
                receiver_id: conv.other_participant.id,
                content,
                conversation_id: conv.id.server_id().map(str::to_string),
                item_id,
                item_type,
            };
            let parts = AttachmentUploader::into_parts(attachments);
            st.outbox.insert(
                temp_id,
                OutboundDraft {
                    outgoing: outgoing.clone(),
                    parts: parts.clone(),
                },
            );
            (outgoing, parts)
        };
        self.events.emit(UiEvent::MessagesUpdated {
            conversation: conversation_id.clone(),
        });
        self.events.emit(UiEvent::ConversationsUpdated);

        self.dispatch_send(conversation_id, temp_id, outgoing, parts)
            .await;
        Ok(MessageId::Temp(temp_id))
    }

    /// Issue the network request for a send attempt and reconcile the
    /// outcome.  Text and attachments travel in one request, so there is a
    /// single atomic result for the whole attempt.
    async fn dispatch_send(
        &self,
        conversation_id: ConversationId,
        temp_id: Uuid,
        outgoing: OutgoingMessage,
        parts: Vec<quadlink_net::AttachmentPart>,
    ) {
        let result = if parts.is_empty() {
            self.transport.send_message(&outgoing).await
        } else {
            self.transport.send_with_attachments(&outgoing, parts).await
        };

        match result {
            Ok(wire) => self.complete_send(conversation_id, temp_id, wire).await,
            Err(e) => {
                warn!(conversation = %conversation_id, temp = %temp_id, error = %e, "Send failed");
                {
                    let mut st = self.state.lock().await;
                    st.store.log_mut(&conversation_id).mark_failed(temp_id);
                }
                if matches!(e, ChatError::Auth(_)) {
                    self.events.emit(UiEvent::Error {
                        message: e.to_string(),
                    });
                }
                self.events.emit(UiEvent::MessageFailed {
                    conversation: conversation_id,
                    temp_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn complete_send(
        &self,
        requested: ConversationId,
        temp_id: Uuid,
        wire: MessageWire,
    ) {
        let confirmed = Message::from_wire(wire);
        let resolved = confirmed.conversation_id.clone();

        {
            let mut st = self.state.lock().await;
            // First confirmed send of a placeholder reveals the server id.
            if requested.is_local() {
                if let Some(sid) = resolved.server_id() {
                    st.store.adopt_server_id(&requested, sid.to_string());
                    st.read_state.rename(&requested, resolved.clone());
                }
            }
            let key = if requested.is_local() {
                resolved.clone()
            } else {
                requested.clone()
            };
            if !st.store.log_mut(&key).confirm(temp_id, confirmed) {
                debug!(temp = %temp_id, "No echo to confirm (already reconciled or dismissed)");
            }
            st.outbox.remove(&temp_id);
        }
        info!(conversation = %resolved, temp = %temp_id, "Send confirmed");
        self.events.emit(UiEvent::MessagesUpdated {
            conversation: resolved,
        });

        // Acks first: once they land the refreshed listing agrees with the
        // locally cleared counters.
        self.flush_read_acks().await;
        if let Err(e) = self.refresh_conversations().await {
            warn!(error = %e, "Conversation refresh after send failed");
        }
    }

    /// Re-attempt a failed send with the exact payload and temporary id of
    /// the original attempt.
    pub async fn retry(&self, temp_id: Uuid) -> Result<()> {
        let (conversation_id, draft) = {
            let mut st = self.state.lock().await;
            let conversation_id = st
                .store
                .find_containing_temp(temp_id)
                .ok_or_else(|| ChatError::Validation(format!("no message temp:{temp_id}")))?;
            let message = st
                .store
                .messages(&conversation_id)
                .iter()
                .find(|m| m.id == MessageId::Temp(temp_id))
                .cloned();
            match message {
                Some(m) if m.delivery_state == DeliveryState::Failed => {}
                _ => {
                    return Err(ChatError::Validation(
                        "only failed messages can be retried".into(),
                    ))
                }
            }
            let mut draft = st
                .outbox
                .get(&temp_id)
                .cloned()
                .ok_or_else(|| ChatError::Validation(format!("no draft for temp:{temp_id}")))?;
            // The placeholder may have adopted its server id since the
            // original attempt failed.
            draft.outgoing.conversation_id = conversation_id.server_id().map(str::to_string);
            st.store.log_mut(&conversation_id).mark_pending(temp_id);
            (conversation_id, draft)
        };
        self.events.emit(UiEvent::MessagesUpdated {
            conversation: conversation_id.clone(),
        });

        self.dispatch_send(conversation_id, temp_id, draft.outgoing, draft.parts)
            .await;
        Ok(())
    }

    /// Remove a failed message after the user acknowledged the failure.
    /// This is the only way a message ever leaves a log.
    pub async fn dismiss_failed(&self, temp_id: Uuid) -> Result<()> {
        let conversation_id = {
            let mut st = self.state.lock().await;
            let conversation_id = st
                .store
                .find_containing_temp(temp_id)
                .ok_or_else(|| ChatError::Validation(format!("no message temp:{temp_id}")))?;
            if !st.store.log_mut(&conversation_id).dismiss(temp_id) {
                return Err(ChatError::Validation(
                    "only failed messages can be dismissed".into(),
                ));
            }
            st.outbox.remove(&temp_id);
            conversation_id
        };
        self.events.emit(UiEvent::MessagesUpdated {
            conversation: conversation_id,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Push merge
    // ------------------------------------------------------------------

    /// Merge one pushed message.
    ///
    /// The sender's own sends come back on the push channel too; a server id
    /// that is already present is dropped rather than duplicated.  Everything
    /// else is inserted at its created_at position and followed by a
    /// background conversation-list refresh, whether or not the message
    /// belongs to the active conversation.
    pub async fn on_push(&self, wire: MessageWire) {
        let message = Message::from_wire(wire);
        let conversation_id = message.conversation_id.clone();

        {
            let mut st = self.state.lock().await;
            if let Some(sid) = message.id.server_id() {
                if st.store.log_mut(&conversation_id).contains_server_id(sid) {
                    debug!(message = %message.id, "Push duplicate of known message, ignoring");
                    return;
                }
            }
            st.store
                .log_mut(&conversation_id)
                .insert_ordered(message.clone());
            st.store
                .apply_incoming_preview(&message, &self.session.user_id);
            if st.store.is_active(&conversation_id) {
                self.mark_read_locked(&mut st, &conversation_id);
            }
        }
        self.events.emit(UiEvent::MessagesUpdated {
            conversation: conversation_id,
        });
        self.events.emit(UiEvent::ConversationsUpdated);

        self.flush_read_acks().await;
        self.spawn_refresh();
    }

    /// Apply a receipt naming a single message this session sent: the other
    /// participant has read it.
    pub async fn on_peer_read_message(&self, message_id: &str) {
        let updated = {
            let mut st = self.state.lock().await;
            match st.store.find_containing_server(message_id) {
                Some(id) => st
                    .store
                    .log_mut(&id)
                    .mark_message_read(message_id)
                    .then_some(id),
                None => None,
            }
        };
        match updated {
            Some(conversation) => self.events.emit(UiEvent::MessagesUpdated { conversation }),
            None => debug!(message = %message_id, "Receipt for unknown or already-read message"),
        }
    }

    /// Apply a whole-conversation receipt: every message this session sent
    /// into it has been read by the other participant.
    pub async fn on_peer_read_conversation(&self, conversation_id: &str) {
        let id = ConversationId::Server(conversation_id.to_string());
        let changed = {
            let mut st = self.state.lock().await;
            st.store.log_mut(&id).mark_read_sent_by(&self.session.user_id)
        };
        if changed > 0 {
            self.events.emit(UiEvent::MessagesUpdated { conversation: id });
        }
    }

    // ------------------------------------------------------------------
    // Read state
    // ------------------------------------------------------------------

    /// Mark a conversation read.  Idempotent; local flags flip immediately
    /// and the server ack is attempted in the background.
    pub async fn mark_read(&self, id: &ConversationId) {
        {
            let mut st = self.state.lock().await;
            self.mark_read_locked(&mut st, id);
        }
        self.events.emit(UiEvent::ConversationsUpdated);
        self.flush_read_acks().await;
    }

    /// Flip local read flags and queue the server ack.  Caller holds the
    /// state lock.
    fn mark_read_locked(&self, st: &mut ClientState, id: &ConversationId) {
        st.store.log_mut(id).mark_read_for(&self.session.user_id);
        st.store.clear_unread(id);
        st.read_state.note_read(id.clone());
    }

    /// Attempt every pending read acknowledgment.  A failed ack never rolls
    /// back local state; the conversation re-enters the pending set and is
    /// retried on the next state-changing event.
    async fn flush_read_acks(&self) {
        let pending = {
            let mut st = self.state.lock().await;
            st.read_state.take_pending_acks()
        };

        for id in pending {
            let Some(sid) = id.server_id().map(str::to_string) else {
                // Placeholder with no server id yet; keep for later.
                let mut st = self.state.lock().await;
                st.read_state.ack_failed(id);
                continue;
            };
            if let Err(e) = self.transport.mark_read(&sid).await {
                warn!(conversation = %id, error = %e, "Read ack failed");
                if matches!(e, ChatError::Auth(_)) {
                    self.events.emit(UiEvent::Error {
                        message: e.to_string(),
                    });
                }
                let mut st = self.state.lock().await;
                st.read_state.ack_failed(id);
            }
        }
    }
}
