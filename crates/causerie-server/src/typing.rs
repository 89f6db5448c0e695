//! Typing indicator relay.
//!
//! Stateless pass-through for transient signals: look the receiver up, hand
//! the event to their connection, done.  Nothing is persisted, the sender
//! gets no acknowledgment, and an offline receiver means the signal simply
//! evaporates.  Clearing the "is typing" indicator after silence is the
//! receiving client's job; no stopped-typing signal exists.

use std::sync::Arc;

use causerie_shared::protocol::ServerEvent;
use causerie_shared::types::UserId;

use crate::presence::PresenceRegistry;

pub struct TypingRelay {
    presence: Arc<PresenceRegistry>,
}

impl TypingRelay {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }

    /// Forward a typing signal from `sender_id` to `receiver_id` if they
    /// are online.
    pub async fn relay(&self, sender_id: UserId, receiver_id: UserId) {
        self.presence
            .notify(receiver_id, ServerEvent::PeerTyping { user_id: sender_id })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    use crate::presence::ConnectionHandle;

    #[tokio::test]
    async fn test_relays_to_online_receiver() {
        let presence = Arc::new(PresenceRegistry::new());
        let relay = TypingRelay::new(presence.clone());
        let sender = UserId::new();
        let receiver = UserId::new();

        let (tx, mut rx) = mpsc::unbounded_channel();
        presence.announce(receiver, ConnectionHandle::new(tx)).await;

        relay.relay(sender, receiver).await;

        match rx.try_recv() {
            Ok(ServerEvent::PeerTyping { user_id }) => assert_eq!(user_id, sender),
            other => panic!("expected typing signal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offline_receiver_drops_silently() {
        let presence = Arc::new(PresenceRegistry::new());
        let relay = TypingRelay::new(presence);

        // No announce: the relay is a no-op and must not error or panic.
        relay.relay(UserId::new(), UserId::new()).await;
    }
}
