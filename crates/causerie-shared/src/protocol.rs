//! The WebSocket event contract between clients and the server.
//!
//! Events travel as JSON text frames, tagged by an `event` field so either
//! side can dispatch without peeking at payloads.  This is the single
//! canonical contract; the legacy clients' two divergent socket vocabularies
//! both map onto it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Attachment, Message};
use crate::types::{MessageId, UserId};

/// Online/offline transition carried by [`ServerEvent::PresenceChanged`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Everything a client may send over the socket.
///
/// Disconnect is implicit (the transport closing), not an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Announce identity after connecting.  Must be the first event; the
    /// connection is bound to this user for its lifetime.
    AnnounceOnline { user_id: UserId },

    /// Send a direct message.  `content` may be empty only when
    /// `attachments` is non-empty.
    SendMessage {
        receiver_id: UserId,
        #[serde(default)]
        content: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },

    /// Acknowledge a single received message as read.
    MarkRead { message_id: MessageId },

    /// Acknowledge every unread message from `sender_id` as read.
    MarkAllRead { sender_id: UserId },

    /// Transient typing indicator for the peer.  Never persisted.
    Typing { receiver_id: UserId },
}

/// Everything the server may push to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new message addressed to this client.
    MessageReceived { message: Message },

    /// Echo of a message this client sent, now durably stored.
    MessageSentAck { message: Message },

    /// A single sent message was read by its receiver.
    MessageRead { message_id: MessageId },

    /// `count` sent messages were read at once by `reader_id`.
    MessagesRead { reader_id: UserId, count: u64 },

    /// The peer is typing.  Clients clear the indicator themselves after a
    /// few seconds of silence; there is no stopped-typing event.
    PeerTyping { user_id: UserId },

    /// A user went online or offline.
    PresenceChanged {
        user_id: UserId,
        status: PresenceStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen_at: Option<DateTime<Utc>>,
    },

    /// Snapshot of currently-online users, pushed right after a successful
    /// announce.
    OnlineUsers { user_ids: Vec<UserId> },

    /// A send could not be completed.  The client renders a distinguishable
    /// failed state; the message was not stored.
    SendFailed { reason: String },
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_round_trip() {
        let event = ClientEvent::SendMessage {
            receiver_id: UserId::new(),
            content: "hi".to_string(),
            attachments: Vec::new(),
        };

        let json = event.to_json().unwrap();
        let restored = ClientEvent::from_json(&json).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_tag_names() {
        let event = ClientEvent::AnnounceOnline {
            user_id: UserId::new(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "announce_online");

        let event = ServerEvent::PresenceChanged {
            user_id: UserId::new(),
            status: PresenceStatus::Offline,
            last_seen_at: Some(Utc::now()),
        };
        let json: serde_json::Value =
            serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "presence_changed");
        assert_eq!(json["data"]["status"], "offline");
    }

    #[test]
    fn test_send_message_defaults() {
        // A client may omit content or attachments entirely.
        let json = format!(
            r#"{{"event":"send_message","data":{{"receiver_id":"{}"}}}}"#,
            UserId::new()
        );
        let event = ClientEvent::from_json(&json).unwrap();
        match event {
            ClientEvent::SendMessage {
                content,
                attachments,
                ..
            } => {
                assert!(content.is_empty());
                assert!(attachments.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
