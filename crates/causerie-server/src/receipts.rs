//! Read-receipt reconciliation.
//!
//! Transitions messages from unread to read through the store's conditional
//! updates and pushes the change to the original sender while they are
//! online.  The conditional update is what makes concurrent acknowledgement
//! safe: whichever caller wins performs the single transition and sends the
//! single notification; the loser observes the benign already-read outcome.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use causerie_shared::protocol::ServerEvent;
use causerie_shared::types::{MessageId, UserId};

use crate::error::ServerError;
use crate::presence::PresenceRegistry;
use crate::storage::MessageService;

pub struct ReadReceiptReconciler {
    store: MessageService,
    presence: Arc<PresenceRegistry>,
}

impl ReadReceiptReconciler {
    pub fn new(store: MessageService, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    /// Mark one message as read by `reader`.
    ///
    /// Returns whether this call performed the transition.  `false` covers
    /// every benign case: unknown id, `reader` is not the receiver, already
    /// read, deleted.  Double-marking under concurrent UI events is common
    /// and must not error.
    pub async fn mark_read(
        &self,
        message_id: MessageId,
        reader: UserId,
    ) -> Result<bool, ServerError> {
        let updated = self.store.mark_read(message_id, reader, Utc::now()).await?;
        if !updated {
            debug!(message_id = %message_id, reader = %reader, "mark_read was a no-op");
            return Ok(false);
        }

        // Only the transition winner notifies, so the sender sees at most
        // one receipt per message.
        let message = self.store.get_message(message_id).await?;
        self.presence
            .notify(message.sender_id, ServerEvent::MessageRead { message_id })
            .await;

        Ok(true)
    }

    /// Mark every unread message from `sender` to `reader` as read in one
    /// atomic step.
    ///
    /// The sender gets a single aggregate notification rather than one per
    /// message.  Returns the number of messages that changed state.
    pub async fn mark_all_read(
        &self,
        reader: UserId,
        sender: UserId,
    ) -> Result<u64, ServerError> {
        let count = self.store.mark_all_read(reader, sender, Utc::now()).await?;
        if count > 0 {
            self.presence
                .notify(
                    sender,
                    ServerEvent::MessagesRead {
                        reader_id: reader,
                        count,
                    },
                )
                .await;
        }
        Ok(count)
    }
}
