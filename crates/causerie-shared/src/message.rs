//! The direct-message record exchanged with clients and persisted by the
//! store.
//!
//! Every struct derives `Serialize` and `Deserialize` so the same shape can
//! travel over the WebSocket contract and the REST query surface without a
//! translation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, UserId};

/// Delivery state of a message.
///
/// The progression is strictly `Sent -> Delivered -> Read` and never
/// regresses.  A persisted message is created as [`Delivered`]: durability is
/// what "delivered" means here, not a live push.  [`Sent`] is the
/// pre-durability state an optimistic client renders, and [`Failed`] marks a
/// send that was rejected before persistence -- neither is ever stored.
///
/// [`Delivered`]: MessageStatus::Delivered
/// [`Sent`]: MessageStatus::Sent
/// [`Failed`]: MessageStatus::Failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

/// What kind of file an attachment references.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

/// Metadata for a file already uploaded through the (external) upload
/// subsystem.  The message core never touches file bytes; it carries the
/// `location_ref` opaque handle through to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Original file name, for display.
    pub name: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Image, video, or generic file.
    pub kind: AttachmentKind,
    /// Opaque storage reference (URL or path) to the uploaded file.
    pub location_ref: String,
    /// Optional storage reference to a thumbnail (images/videos).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<String>,
}

/// A single direct message.
///
/// Attachment order is preserved as sent; clients display them in sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Text body.  Empty only when `attachments` is non-empty.
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    /// Set at creation: persistence is what makes a message "delivered".
    pub delivered_at: DateTime<Utc>,
    /// Set at most once, when the receiver acknowledges the message.
    pub read_at: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Construct a freshly persisted (and therefore delivered) message.
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        content: String,
        attachments: Vec<Attachment>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender_id,
            receiver_id,
            content,
            attachments,
            created_at: now,
            delivered_at: now,
            read_at: None,
            status: MessageStatus::Delivered,
            deleted: false,
            deleted_at: None,
        }
    }

    /// Whether the receiver has not yet acknowledged this message.
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}
