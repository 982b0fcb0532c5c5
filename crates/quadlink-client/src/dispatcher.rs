//! Single ordered consumer of push-channel notifications.
//!
//! All socket notifications funnel through one task and are applied one at a
//! time, in arrival order, so two pushes can never reconcile against the
//! store concurrently.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use quadlink_net::{MessageTransport, SocketNotification};

use crate::events::{EventSender, UiEvent};
use crate::reconciler::MessageReconciler;

/// Consume socket notifications until the channel closes.
pub async fn run_dispatcher<T: MessageTransport + 'static>(
    mut notifications: mpsc::Receiver<SocketNotification>,
    reconciler: Arc<MessageReconciler<T>>,
    events: EventSender,
) {
    while let Some(notification) = notifications.recv().await {
        match notification {
            SocketNotification::Connected => {
                info!("Push channel connected");
                events.emit(UiEvent::SocketStatus { connected: true });
                // Messages pushed while disconnected are only on the server;
                // a refresh brings the previews back in sync.
                if let Err(e) = reconciler.refresh_conversations().await {
                    warn!(error = %e, "Refresh after reconnect failed");
                }
            }
            SocketNotification::Disconnected => {
                info!("Push channel disconnected");
                events.emit(UiEvent::SocketStatus { connected: false });
            }
            SocketNotification::MessageReceived(wire) => {
                debug!(message = %wire.id, "Push message received");
                reconciler.on_push(wire).await;
            }
            SocketNotification::MessageRead { message_id } => {
                reconciler.on_peer_read_message(&message_id).await;
            }
            SocketNotification::ConversationRead { conversation_id } => {
                reconciler.on_peer_read_conversation(&conversation_id).await;
            }
            SocketNotification::ServerError(message) => {
                warn!(%message, "Push channel server error");
                events.emit(UiEvent::Error { message });
            }
        }
    }
    debug!("Notification channel closed, dispatcher exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::mpsc;

    use quadlink_net::AttachmentPart;
    use quadlink_shared::protocol::{ConversationWire, MessageWire, OutgoingMessage};
    use quadlink_shared::types::{ConversationId, UserId};
    use quadlink_shared::{ChatError, Result};

    use crate::attachments::AttachmentUploader;
    use crate::session::SessionContext;

    struct NullTransport;

    #[async_trait]
    impl MessageTransport for NullTransport {
        async fn list_conversations(&self) -> Result<Vec<ConversationWire>> {
            Ok(Vec::new())
        }
        async fn conversation_messages(&self, _id: &str) -> Result<Vec<MessageWire>> {
            Ok(Vec::new())
        }
        async fn mark_read(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn send_message(&self, _outgoing: &OutgoingMessage) -> Result<MessageWire> {
            Err(ChatError::Network("unused".into()))
        }
        async fn send_with_attachments(
            &self,
            _outgoing: &OutgoingMessage,
            _parts: Vec<AttachmentPart>,
        ) -> Result<MessageWire> {
            Err(ChatError::Network("unused".into()))
        }
    }

    fn setup() -> (
        Arc<MessageReconciler<NullTransport>>,
        EventSender,
        mpsc::Receiver<UiEvent>,
    ) {
        let (tx, rx) = mpsc::channel(64);
        let events = EventSender::new(tx);
        let core = Arc::new(MessageReconciler::new(
            Arc::new(NullTransport),
            SessionContext::new(UserId::new("me"), "token", "Me"),
            AttachmentUploader::new(5, 5 * 1024 * 1024),
            events.clone(),
        ));
        (core, events, rx)
    }

    #[tokio::test]
    async fn test_notifications_applied_in_arrival_order() {
        let (core, events, mut rx) = setup();
        let (tx, notifications) = mpsc::channel(16);

        let t0 = Utc::now();
        let wire = |id: &str, at| MessageWire {
            id: id.into(),
            conversation_id: "c1".into(),
            sender_id: UserId::new("bob"),
            receiver_id: UserId::new("me"),
            content: id.into(),
            attachment_url: None,
            created_at: at,
            read: false,
        };

        tx.send(SocketNotification::Connected).await.unwrap();
        tx.send(SocketNotification::MessageReceived(wire("m1", t0)))
            .await
            .unwrap();
        tx.send(SocketNotification::MessageReceived(wire(
            "m2",
            t0 + chrono::Duration::seconds(1),
        )))
        .await
        .unwrap();
        tx.send(SocketNotification::MessageRead {
            message_id: "m1".into(),
        })
        .await
        .unwrap();
        tx.send(SocketNotification::ServerError("rate limited".into()))
            .await
            .unwrap();
        tx.send(SocketNotification::Disconnected).await.unwrap();
        drop(tx);

        run_dispatcher(notifications, core.clone(), events).await;

        let c1 = ConversationId::Server("c1".into());
        let messages = core.messages_of(&c1).await;
        let ids: Vec<_> = messages.iter().map(|m| m.id.to_string()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(messages[0].read, "read receipt routed to the store");
        assert!(!messages[1].read);

        let mut statuses = Vec::new();
        let mut errors = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                UiEvent::SocketStatus { connected } => statuses.push(connected),
                UiEvent::Error { message } => errors.push(message),
                _ => {}
            }
        }
        assert_eq!(statuses, vec![true, false]);
        assert_eq!(errors, vec!["rate limited"]);
    }
}
