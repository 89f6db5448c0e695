//! Store-level model structs.
//!
//! The message record itself lives in `causerie-shared` (it travels over the
//! wire unchanged); this module holds the shapes that only exist on the read
//! side of the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use causerie_shared::message::Message;
use causerie_shared::types::UserId;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user.  The account subsystem owns the full profile; the
/// message core reads only what it needs for validation and display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation projection
// ---------------------------------------------------------------------------

/// One row of the per-user conversation list: the peer, the most recent
/// message exchanged with them, and how many of their messages are unread.
///
/// Derived fresh from the `messages` table on every request; never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub peer: UserRecord,
    pub last_message: Message,
    pub unread_count: u64,
}
