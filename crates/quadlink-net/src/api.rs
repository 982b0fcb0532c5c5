//! Bearer-authenticated REST client for the messaging backend.

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::StatusCode;
use tracing::debug;

use quadlink_shared::protocol::{ConversationWire, MessageWire, OutgoingMessage};
use quadlink_shared::{ChatError, Result};

use crate::transport::{AttachmentPart, MessageTransport};

/// HTTP client for the five messaging endpoints.
///
/// Every call carries the session's bearer token; credential problems are
/// mapped to [`ChatError::Auth`] and everything else transport-related to
/// [`ChatError::Network`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: trim_trailing_slash(base_url.into()),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Map an HTTP response to the error taxonomy, passing successes through.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ChatError::Auth(format!(
                "{status}: {body}"
            ))),
            _ => Err(ChatError::Network(format!("{status}: {body}"))),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Self::check(resp)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))
    }
}

#[async_trait]
impl MessageTransport for ApiClient {
    async fn list_conversations(&self) -> Result<Vec<ConversationWire>> {
        debug!("GET /conversations");
        self.get_json("/conversations").await
    }

    async fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<MessageWire>> {
        debug!(conversation = conversation_id, "GET /conversations/{{id}}");
        self.get_json(&format!("/conversations/{conversation_id}"))
            .await
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        debug!(conversation = conversation_id, "PUT /conversations/{{id}}/read");
        let resp = self
            .http
            .put(self.url(&format!("/conversations/{conversation_id}/read")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<MessageWire> {
        debug!(receiver = %outgoing.receiver_id, "POST /messages");
        let resp = self
            .http
            .post(self.url("/messages"))
            .bearer_auth(&self.token)
            .json(outgoing)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Self::check(resp)
            .await?
            .json::<MessageWire>()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))
    }

    async fn send_with_attachments(
        &self,
        outgoing: &OutgoingMessage,
        parts: Vec<AttachmentPart>,
    ) -> Result<MessageWire> {
        debug!(
            receiver = %outgoing.receiver_id,
            files = parts.len(),
            "POST /messages/upload"
        );

        let mut form = multipart::Form::new()
            .text("receiver_id", outgoing.receiver_id.to_string())
            .text("content", outgoing.content.clone());
        if let Some(ref id) = outgoing.conversation_id {
            form = form.text("conversation_id", id.clone());
        }
        if let Some(ref item_id) = outgoing.item_id {
            form = form.text("item_id", item_id.clone());
        }
        if let Some(ref item_type) = outgoing.item_type {
            form = form.text("item_type", item_type.clone());
        }
        for part in parts {
            let file = multipart::Part::bytes(part.bytes)
                .file_name(part.file_name)
                .mime_str(&part.mime)
                .map_err(|e| ChatError::Validation(format!("invalid mime type: {e}")))?;
            form = form.part("file", file);
        }

        let resp = self
            .http
            .post(self.url("/messages/upload"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Self::check(resp)
            .await?
            .json::<MessageWire>()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use quadlink_shared::types::UserId;

    fn message_body(id: &str, content: &str) -> serde_json::Value {
        serde_json::json!({
            "_id": id,
            "conversation_id": "c1",
            "sender_id": "u1",
            "receiver_id": "u2",
            "content": content,
            "created_at": "2025-03-01T12:00:00Z",
            "read": false
        })
    }

    #[tokio::test]
    async fn test_list_conversations_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations"))
            .and(bearer_token("tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "_id": "c1",
                "participant1_id": "u1",
                "participant2_id": "u2",
                "other_participant": {"id": "u2", "name": "Bob"},
                "last_message": "hey",
                "last_message_time": "2025-03-01T12:00:00Z",
                "unread_count": 2
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "tok").unwrap();
        let conversations = client.list_conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, "c1");
        assert_eq!(conversations[0].unread_count, 2);
    }

    #[tokio::test]
    async fn test_send_message_posts_json_body() {
        let server = MockServer::start().await;
        let outgoing = OutgoingMessage {
            receiver_id: UserId::new("u2"),
            content: "Hello".into(),
            conversation_id: Some("c1".into()),
            item_id: None,
            item_type: None,
        };
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_json(serde_json::json!({
                "receiver_id": "u2",
                "content": "Hello",
                "conversation_id": "c1"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(message_body("m1", "Hello")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "tok").unwrap();
        let confirmed = client.send_message(&outgoing).await.unwrap();
        assert_eq!(confirmed.id, "m1");
        assert_eq!(confirmed.content, "Hello");
    }

    #[tokio::test]
    async fn test_expired_credential_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "stale").unwrap();
        match client.list_conversations().await {
            Err(ChatError::Auth(msg)) => assert!(msg.contains("token expired")),
            other => panic!("expected Auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_maps_to_network_error_and_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/conversations/c1/read"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "tok").unwrap();
        let err = client.mark_read("c1").await.unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_mark_read_hits_read_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/conversations/c7/read"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "tok").unwrap();
        client.mark_read("c7").await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_is_one_multipart_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/upload"))
            .respond_with(ResponseTemplate::new(201).set_body_json(message_body("m2", "")))
            .expect(1)
            .mount(&server)
            .await;

        let outgoing = OutgoingMessage {
            receiver_id: UserId::new("u2"),
            content: String::new(),
            conversation_id: Some("c1".into()),
            item_id: None,
            item_type: None,
        };
        let parts = vec![AttachmentPart {
            file_name: "photo.png".into(),
            mime: "image/png".into(),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        }];

        let client = ApiClient::new(server.uri(), "tok").unwrap();
        let confirmed = client.send_with_attachments(&outgoing, parts).await.unwrap();
        assert_eq!(confirmed.id, "m2");
    }
}
