//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start with zero
//! configuration against a local backend.

use std::time::Duration;

use quadlink_shared::constants::{
    DEFAULT_API_URL, DEFAULT_SOCKET_URL, MAX_ATTACHMENTS_PER_MESSAGE, MAX_ATTACHMENT_BYTES,
    SOCKET_BACKOFF_INITIAL_MS, SOCKET_BACKOFF_MAX_MS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the messaging REST API.
    /// Env: `API_URL`
    pub api_url: String,

    /// Websocket URL of the push endpoint.
    /// Env: `SOCKET_URL`
    pub socket_url: String,

    /// Maximum attachments allowed on one message.
    /// Env: `MAX_ATTACHMENTS_PER_MESSAGE`
    pub max_attachments: usize,

    /// Maximum size of a single attachment in bytes.
    /// Env: `MAX_ATTACHMENT_BYTES`
    pub max_attachment_bytes: usize,

    /// First reconnect delay for the push connection.
    pub socket_backoff_initial: Duration,

    /// Upper bound on the reconnect delay.
    pub socket_backoff_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            max_attachments: MAX_ATTACHMENTS_PER_MESSAGE,
            max_attachment_bytes: MAX_ATTACHMENT_BYTES,
            socket_backoff_initial: Duration::from_millis(SOCKET_BACKOFF_INITIAL_MS),
            socket_backoff_max: Duration::from_millis(SOCKET_BACKOFF_MAX_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("API_URL") {
            config.api_url = url;
        }

        if let Ok(url) = std::env::var("SOCKET_URL") {
            config.socket_url = url;
        }

        if let Ok(val) = std::env::var("MAX_ATTACHMENTS_PER_MESSAGE") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_attachments = n;
            } else {
                tracing::warn!(value = %val, "Invalid MAX_ATTACHMENTS_PER_MESSAGE, using default");
            }
        }

        if let Ok(val) = std::env::var("MAX_ATTACHMENT_BYTES") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_attachment_bytes = n;
            } else {
                tracing::warn!(value = %val, "Invalid MAX_ATTACHMENT_BYTES, using default");
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
