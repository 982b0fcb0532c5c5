//! # quadlink-store
//!
//! In-memory client state for the Quadlink messaging core.
//!
//! All shared mutable state (the conversation registry and the
//! per-conversation message lists) lives behind typed operations in this
//! crate; no other code path mutates the collections directly.  Persistence
//! across restarts is deliberately out of scope.

pub mod conversations;
pub mod messages;
pub mod models;
pub mod read_state;

pub use conversations::ConversationStore;
pub use messages::MessageLog;
pub use models::{AttachmentRef, Conversation, Message, Participant};
pub use read_state::ReadStateTracker;
