//! Persistent push connection with tokio mpsc command/notification pattern.
//!
//! The connection loop runs in a dedicated tokio task.  External code talks
//! to it through typed command and notification channels, so the push layer
//! stays fully asynchronous and decoupled from the REST paths: a broken
//! socket degrades the client to manual refresh, nothing more.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::{debug, info, warn};

use quadlink_shared::constants::{
    SOCKET_BACKOFF_INITIAL_MS, SOCKET_BACKOFF_MAX_MS, SOCKET_CHANNEL_CAPACITY,
};
use quadlink_shared::protocol::{ClientFrame, MessageWire, ServerFrame};
use quadlink_shared::types::UserId;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the socket task.
#[derive(Debug)]
pub enum SocketCommand {
    /// Gracefully shut down the connection and the task.
    Shutdown,
}

/// Notifications sent *from* the socket task to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketNotification {
    /// The connection is established and this session is registered.
    Connected,
    /// The connection dropped; a reconnect attempt is scheduled.
    Disconnected,
    /// A `new_message` push frame arrived.  Forwarded exactly once.
    MessageReceived(MessageWire),
    /// The other participant read one message this session sent.
    MessageRead { message_id: String },
    /// The other participant read a whole conversation.
    ConversationRead { conversation_id: String },
    /// A non-fatal `error` frame from the server.
    ServerError(String),
}

/// Configuration for spawning the socket task.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Websocket URL of the push endpoint.
    pub url: String,
    /// Identity registered with the server so pushes can be routed here.
    pub user_id: UserId,
    /// First reconnect delay; doubles per failed attempt.
    pub backoff_initial: Duration,
    /// Upper bound on the reconnect delay.
    pub backoff_max: Duration,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>, user_id: UserId) -> Self {
        Self {
            url: url.into(),
            user_id,
            backoff_initial: Duration::from_millis(SOCKET_BACKOFF_INITIAL_MS),
            backoff_max: Duration::from_millis(SOCKET_BACKOFF_MAX_MS),
        }
    }
}

/// Outcome of one connection lifetime, decided inside the inner loop.
enum SessionEnd {
    /// Shutdown was requested; leave the outer reconnect loop.
    Shutdown,
    /// The connection dropped; reconnect after backoff.
    Dropped,
}

/// Spawn the push connection in a background tokio task.
///
/// Returns channels for sending commands and receiving notifications.  The
/// task reconnects forever with bounded exponential backoff and registers the
/// user exactly once per established connection.
pub fn spawn_socket(
    config: SocketConfig,
) -> (
    mpsc::Sender<SocketCommand>,
    mpsc::Receiver<SocketNotification>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SocketCommand>(SOCKET_CHANNEL_CAPACITY);
    let (notif_tx, notif_rx) = mpsc::channel::<SocketNotification>(SOCKET_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut backoff = config.backoff_initial;

        loop {
            match tokio_tungstenite::connect_async(&config.url).await {
                Ok((stream, _)) => {
                    backoff = config.backoff_initial;
                    info!(url = %config.url, "Push connection established");

                    match run_session(stream, &config, &mut cmd_rx, &notif_tx).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Dropped => {
                            let _ = notif_tx.send(SocketNotification::Disconnected).await;
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %config.url, error = %e, "Push connection failed");
                }
            }

            // Wait out the backoff, still responsive to Shutdown.
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                cmd = cmd_rx.recv() => {
                    if matches!(cmd, Some(SocketCommand::Shutdown) | None) {
                        break;
                    }
                }
            }
            backoff = (backoff * 2).min(config.backoff_max);
        }

        info!("Push connection task terminated");
    });

    (cmd_tx, notif_rx)
}

/// Drive one established connection: register, then pump frames until the
/// stream ends or shutdown is requested.
async fn run_session(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    config: &SocketConfig,
    cmd_rx: &mut mpsc::Receiver<SocketCommand>,
    notif_tx: &mpsc::Sender<SocketNotification>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    // Register once per connection establishment, never again within it.
    let register = ClientFrame::RegisterUser {
        user_id: config.user_id.clone(),
    };
    let json = match register.to_json() {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "Failed to encode register frame");
            return SessionEnd::Dropped;
        }
    };
    if let Err(e) = write.send(tungstenite::Message::Text(json)).await {
        warn!(error = %e, "Failed to register user on push connection");
        return SessionEnd::Dropped;
    }
    debug!(user = %config.user_id, "Registered user on push connection");
    let _ = notif_tx.send(SocketNotification::Connected).await;

    loop {
        tokio::select! {
            // --- Incoming commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SocketCommand::Shutdown) => {
                        info!("Push connection shutdown requested");
                        let _ = write.send(tungstenite::Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                    None => {
                        // All senders dropped
                        info!("Command channel closed, shutting down push connection");
                        return SessionEnd::Shutdown;
                    }
                }
            }

            // --- Incoming frames ---
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_frame(&text, notif_tx).await;
                    }
                    Some(Ok(tungstenite::Message::Ping(payload))) => {
                        let _ = write.send(tungstenite::Message::Pong(payload)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        warn!("Push connection closed by server");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(other)) => {
                        debug!(frame = ?other, "Ignoring non-text push frame");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Push connection read error");
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }
}

/// Decode one text frame and forward it downstream.
async fn handle_frame(text: &str, notif_tx: &mpsc::Sender<SocketNotification>) {
    match ServerFrame::from_json(text) {
        Ok(ServerFrame::NewMessage { message }) => {
            debug!(message = %message.id, conversation = %message.conversation_id, "Push message received");
            let _ = notif_tx
                .send(SocketNotification::MessageReceived(message))
                .await;
        }
        Ok(ServerFrame::MessageRead { message_id }) => {
            debug!(message = %message_id, "Read receipt received");
            let _ = notif_tx
                .send(SocketNotification::MessageRead { message_id })
                .await;
        }
        Ok(ServerFrame::ConversationRead { conversation_id }) => {
            debug!(conversation = %conversation_id, "Conversation read receipt received");
            let _ = notif_tx
                .send(SocketNotification::ConversationRead { conversation_id })
                .await;
        }
        Ok(ServerFrame::Error { message }) => {
            warn!(message = %message, "Push channel server error");
            let _ = notif_tx
                .send(SocketNotification::ServerError(message))
                .await;
        }
        Err(e) => {
            warn!(error = %e, "Unparseable push frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one websocket connection, assert the register frame, deliver
    /// the given frames, then drop the connection.
    async fn serve_one(
        listener: &TcpListener,
        expected_user: &str,
        frames: Vec<String>,
    ) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let first = ws.next().await.unwrap().unwrap();
        let register: ServerFrameProbe =
            serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert_eq!(register.event, "register_user");
        assert_eq!(register.data["user_id"], expected_user);

        for frame in frames {
            ws.send(tungstenite::Message::Text(frame)).await.unwrap();
        }
        // Connection drops when `ws` goes out of scope.
    }

    #[derive(serde::Deserialize)]
    struct ServerFrameProbe {
        event: String,
        data: serde_json::Value,
    }

    fn push_frame(id: &str, content: &str) -> String {
        serde_json::json!({
            "event": "new_message",
            "data": { "message": {
                "_id": id,
                "conversation_id": "c1",
                "sender_id": "u2",
                "receiver_id": "u1",
                "content": content,
                "created_at": "2025-03-01T12:00:00Z"
            }}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_registers_then_forwards_each_push_exactly_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            serve_one(
                &listener,
                "u1",
                vec![push_frame("m1", "hi"), push_frame("m2", "again")],
            )
            .await;
        });

        let mut config = SocketConfig::new(format!("ws://{addr}"), UserId::new("u1"));
        config.backoff_initial = Duration::from_millis(10);
        let (cmd_tx, mut notif_rx) = spawn_socket(config);

        assert_eq!(notif_rx.recv().await, Some(SocketNotification::Connected));
        match notif_rx.recv().await {
            Some(SocketNotification::MessageReceived(m)) => assert_eq!(m.id, "m1"),
            other => panic!("unexpected notification: {other:?}"),
        }
        match notif_rx.recv().await {
            Some(SocketNotification::MessageReceived(m)) => assert_eq!(m.id, "m2"),
            other => panic!("unexpected notification: {other:?}"),
        }

        server.await.unwrap();
        cmd_tx.send(SocketCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_and_reregisters_after_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First connection: deliver one message, then drop.
            serve_one(&listener, "u1", vec![push_frame("m1", "hi")]).await;
            // Second connection: the client must register again (exactly
            // once per connection), then receive the next message.
            serve_one(&listener, "u1", vec![push_frame("m2", "back")]).await;
        });

        let mut config = SocketConfig::new(format!("ws://{addr}"), UserId::new("u1"));
        config.backoff_initial = Duration::from_millis(10);
        config.backoff_max = Duration::from_millis(50);
        let (cmd_tx, mut notif_rx) = spawn_socket(config);

        let mut seen = Vec::new();
        while seen.len() < 2 {
            match notif_rx.recv().await {
                Some(SocketNotification::MessageReceived(m)) => seen.push(m.id),
                Some(_) => {}
                None => panic!("notification channel closed early"),
            }
        }
        assert_eq!(seen, vec!["m1", "m2"]);

        server.await.unwrap();
        cmd_tx.send(SocketCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_receipt_frames_are_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            serve_one(
                &listener,
                "u1",
                vec![
                    serde_json::json!({"event": "message_read", "data": {"message_id": "m1"}})
                        .to_string(),
                    serde_json::json!({"event": "conversation_read", "data": {"conversation_id": "c1"}})
                        .to_string(),
                ],
            )
            .await;
        });

        let mut config = SocketConfig::new(format!("ws://{addr}"), UserId::new("u1"));
        config.backoff_initial = Duration::from_millis(10);
        let (cmd_tx, mut notif_rx) = spawn_socket(config);

        assert_eq!(notif_rx.recv().await, Some(SocketNotification::Connected));
        assert_eq!(
            notif_rx.recv().await,
            Some(SocketNotification::MessageRead {
                message_id: "m1".into()
            })
        );
        assert_eq!(
            notif_rx.recv().await,
            Some(SocketNotification::ConversationRead {
                conversation_id: "c1".into()
            })
        );

        server.await.unwrap();
        cmd_tx.send(SocketCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_frame_is_surfaced_not_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            serve_one(
                &listener,
                "u1",
                vec![
                    serde_json::json!({"event": "error", "data": {"message": "rate limited"}})
                        .to_string(),
                    push_frame("m1", "still alive"),
                ],
            )
            .await;
        });

        let mut config = SocketConfig::new(format!("ws://{addr}"), UserId::new("u1"));
        config.backoff_initial = Duration::from_millis(10);
        let (cmd_tx, mut notif_rx) = spawn_socket(config);

        assert_eq!(notif_rx.recv().await, Some(SocketNotification::Connected));
        assert_eq!(
            notif_rx.recv().await,
            Some(SocketNotification::ServerError("rate limited".into()))
        );
        match notif_rx.recv().await {
            Some(SocketNotification::MessageReceived(m)) => assert_eq!(m.id, "m1"),
            other => panic!("unexpected notification: {other:?}"),
        }

        server.await.unwrap();
        cmd_tx.send(SocketCommand::Shutdown).await.unwrap();
    }
}
