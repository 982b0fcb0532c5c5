//! Explicit session context passed into the messaging core.
//!
//! Business logic never reads credentials from ambient state; everything it
//! needs about the authenticated user travels in this struct, which keeps
//! the core testable without global mocks.

use serde::{Deserialize, Serialize};

use quadlink_shared::types::UserId;

/// The authenticated user's identity and credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: UserId,
    /// Bearer token attached to every REST call.
    pub token: String,
    pub display_name: String,
}

impl SessionContext {
    pub fn new(
        user_id: UserId,
        token: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            token: token.into(),
            display_name: display_name.into(),
        }
    }
}

/// Seed for a conversation originated from another subsystem's listing
/// ("message the seller").  `item_id`/`item_type` are opaque to the core and
/// travel unmodified on the outbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemContext {
    pub receiver_id: UserId,
    pub receiver_name: String,
    pub seed_content: String,
    pub item_id: String,
    pub item_type: String,
}
