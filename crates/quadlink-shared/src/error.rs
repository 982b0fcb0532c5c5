use thiserror::Error;

/// Errors surfaced by the messaging core.
///
/// The variants map one-to-one onto the client's failure policy: `Network`
/// marks the affected message `Failed` and offers retry, `Auth` blocks the
/// operation with a visible prompt, `Validation` is rejected before any
/// network call is made.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Transient transport failure (timeout, connection reset, 5xx).
    #[error("Network error: {0}")]
    Network(String),

    /// Missing or expired credential (401/403). No silent retry.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Client-side rejection before any network activity.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Push channel failure. Non-fatal; REST paths keep working.
    #[error("Socket error: {0}")]
    Socket(String),

    /// Malformed payload from the server.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    /// Whether the affected send may be retried by the user.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Socket(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ChatError>;
