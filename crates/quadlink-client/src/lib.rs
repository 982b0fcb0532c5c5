//! # quadlink-client
//!
//! The messaging core of the Quadlink campus portal client: conversation
//! state, optimistic sends with server reconciliation, the push-event
//! pipeline, attachment staging, and read-state synchronization.
//!
//! A UI layer drives [`ChatClient`] and renders from the [`UiEvent`] stream;
//! it never owns messaging state of its own.

pub mod attachments;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod reconciler;
pub mod session;
pub mod state;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use quadlink_net::{spawn_socket, ApiClient, SocketCommand, SocketConfig};
use quadlink_shared::constants::UI_EVENT_CHANNEL_CAPACITY;
use quadlink_shared::types::{ConversationId, MessageId};
use quadlink_shared::Result;
use quadlink_store::{Conversation, Message, Participant};
use uuid::Uuid;

pub use crate::attachments::{AttachmentUploader, StagedAttachment};
pub use crate::config::ClientConfig;
pub use crate::events::{EventSender, UiEvent};
pub use crate::reconciler::MessageReconciler;
pub use crate::session::{ItemContext, SessionContext};

/// Install the global tracing subscriber.  Call once at startup; `RUST_LOG`
/// overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("quadlink_client=debug,quadlink_net=debug,quadlink_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Facade over the reconciler, the push connection, and the dispatcher task.
pub struct ChatClient {
    core: Arc<MessageReconciler<ApiClient>>,
    socket_cmd: mpsc::Sender<SocketCommand>,
}

impl ChatClient {
    /// Build the client, spawn the push connection and its dispatcher, and
    /// return the UI event stream.
    ///
    /// The push connection comes up in the background; REST operations work
    /// immediately, whether or not the socket ever connects.
    pub fn connect(
        config: ClientConfig,
        session: SessionContext,
    ) -> Result<(Self, mpsc::Receiver<UiEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(UI_EVENT_CHANNEL_CAPACITY);
        let events = EventSender::new(event_tx);

        let transport = Arc::new(ApiClient::new(&config.api_url, &session.token)?);
        let uploader = AttachmentUploader::new(config.max_attachments, config.max_attachment_bytes);
        let core = Arc::new(MessageReconciler::new(
            transport,
            session.clone(),
            uploader,
            events.clone(),
        ));

        let mut socket_config = SocketConfig::new(&config.socket_url, session.user_id);
        socket_config.backoff_initial = config.socket_backoff_initial;
        socket_config.backoff_max = config.socket_backoff_max;
        let (socket_cmd, notifications) = spawn_socket(socket_config);

        tokio::spawn(dispatcher::run_dispatcher(
            notifications,
            core.clone(),
            events,
        ));

        Ok((Self { core, socket_cmd }, event_rx))
    }

    /// Fetch the conversation list from the server and merge it in.
    pub async fn refresh_conversations(&self) -> Result<()> {
        self.core.refresh_conversations().await
    }

    /// Current conversation list, newest activity first.
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.core.conversations().await
    }

    /// Messages of one conversation, oldest first.
    pub async fn messages_of(&self, id: &ConversationId) -> Vec<Message> {
        self.core.messages_of(id).await
    }

    /// Switch the active conversation and load its history.
    pub async fn select_conversation(&self, id: ConversationId) -> Result<()> {
        self.core.select_conversation(id).await
    }

    /// The conversation with `other`, created locally on first contact.
    pub async fn get_or_create_conversation(&self, other: Participant) -> ConversationId {
        self.core.get_or_create_conversation(other).await
    }

    /// Stage attachment bytes for an upcoming send.
    pub fn stage_attachment(
        &self,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<StagedAttachment> {
        self.core.uploader().stage(file_name, mime, bytes)
    }

    /// Send a message with an optimistic local echo.
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        content: &str,
        attachments: Vec<StagedAttachment>,
    ) -> Result<MessageId> {
        self.core.send(conversation_id, content, attachments).await
    }

    /// Start a conversation seeded from another subsystem's listing.
    pub async fn send_seeded(&self, item: ItemContext) -> Result<MessageId> {
        self.core.send_seeded(item).await
    }

    /// Retry a failed send with its original payload.
    pub async fn retry(&self, temp_id: Uuid) -> Result<()> {
        self.core.retry(temp_id).await
    }

    /// Remove a failed message the user chose to discard.
    pub async fn dismiss_failed(&self, temp_id: Uuid) -> Result<()> {
        self.core.dismiss_failed(temp_id).await
    }

    /// Mark a conversation read.
    pub async fn mark_read(&self, id: &ConversationId) {
        self.core.mark_read(id).await
    }

    /// Gracefully stop the push connection.
    pub async fn shutdown(&self) {
        if self.socket_cmd.send(SocketCommand::Shutdown).await.is_err() {
            debug!("Socket task already stopped");
        }
    }
}
