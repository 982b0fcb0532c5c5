/// Maximum number of attachments allowed on a single message.
pub const MAX_ATTACHMENTS_PER_MESSAGE: usize = 5;

/// Maximum size of a single attachment in bytes (5 MiB).
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

/// MIME types accepted for attachments (image uploads only).
pub const ALLOWED_ATTACHMENT_MIME: &[&str] =
    &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Initial delay before reconnecting a dropped push connection.
pub const SOCKET_BACKOFF_INITIAL_MS: u64 = 500;

/// Upper bound on the reconnect backoff.
pub const SOCKET_BACKOFF_MAX_MS: u64 = 30_000;

/// Capacity of the socket command / notification channels.
pub const SOCKET_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the UI event channel.
pub const UI_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api/messages";

/// Default push (websocket) URL.
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000/socket";
