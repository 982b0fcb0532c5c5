//! # quadlink-shared
//!
//! Types shared by every layer of the Quadlink messaging client: domain
//! identifiers, the REST/push wire protocol, the error taxonomy, and the
//! validation constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ChatError, Result};
pub use types::{ConversationId, DeliveryState, MessageId, UserId};
