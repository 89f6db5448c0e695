//! The delivery router: validate, persist, then route.
//!
//! Persistence strictly precedes the live push.  A crash between the two
//! leaves a durable message the receiver picks up on their next history
//! fetch; the reverse order could acknowledge a message that never existed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use causerie_shared::constants::{
    DELETE_RETENTION_SECS, MAX_ATTACHMENTS, MAX_ATTACHMENT_BYTES, MAX_CONTENT_BYTES,
};
use causerie_shared::message::{Attachment, Message};
use causerie_shared::protocol::ServerEvent;
use causerie_shared::types::{MessageId, UserId};

use crate::auth::UserDirectory;
use crate::error::ServerError;
use crate::presence::{ConnectionHandle, PresenceRegistry};
use crate::storage::MessageService;

pub struct DeliveryRouter {
    store: MessageService,
    presence: Arc<PresenceRegistry>,
    directory: Arc<dyn UserDirectory>,
}

impl DeliveryRouter {
    pub fn new(
        store: MessageService,
        presence: Arc<PresenceRegistry>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            store,
            presence,
            directory,
        }
    }

    /// Accept an outbound message: validate, persist durably, push to the
    /// receiver if online, and echo an ack to the connection that sent it.
    ///
    /// The live push is at-most-once and best-effort; only validation and
    /// persistence can fail the send.
    pub async fn send(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: String,
        attachments: Vec<Attachment>,
        origin: &ConnectionHandle,
    ) -> Result<Message, ServerError> {
        validate_payload(sender_id, receiver_id, &content, &attachments)?;

        if !self.directory.user_exists(receiver_id).await? {
            return Err(ServerError::NotFound);
        }

        let message = Message::new(sender_id, receiver_id, content, attachments, Utc::now());
        self.store.insert_message(message.clone()).await?;

        // Durable from here on; everything below is best-effort.
        let pushed = self
            .presence
            .notify(
                receiver_id,
                ServerEvent::MessageReceived {
                    message: message.clone(),
                },
            )
            .await;

        if !origin.push(ServerEvent::MessageSentAck {
            message: message.clone(),
        }) {
            debug!(message_id = %message.id, "sender disconnected before ack");
        }

        info!(
            message_id = %message.id,
            sender = %sender_id,
            receiver = %receiver_id,
            live_push = pushed,
            "message routed"
        );

        Ok(message)
    }

    /// Soft-delete a message.
    ///
    /// Only the sender may delete, and only within the retention window of
    /// the message's creation.  The final conditional update resolves a
    /// race between two deletes: the loser sees the benign not-found
    /// outcome.
    pub async fn delete_message(
        &self,
        message_id: MessageId,
        caller: UserId,
    ) -> Result<(), ServerError> {
        let message = self.store.get_message(message_id).await?;

        if message.deleted {
            return Err(ServerError::NotFound);
        }
        if message.sender_id != caller {
            return Err(ServerError::Unauthorized(
                "only the sender may delete a message".to_string(),
            ));
        }

        let now = Utc::now();
        if now - message.created_at >= Duration::seconds(DELETE_RETENTION_SECS) {
            return Err(ServerError::Unauthorized(
                "the delete window has elapsed".to_string(),
            ));
        }

        if !self.store.soft_delete_message(message_id, now).await? {
            return Err(ServerError::NotFound);
        }

        info!(message_id = %message_id, sender = %caller, "message deleted");
        Ok(())
    }
}

fn validate_payload(
    sender_id: UserId,
    receiver_id: UserId,
    content: &str,
    attachments: &[Attachment],
) -> Result<(), ServerError> {
    if sender_id == receiver_id {
        return Err(ServerError::Invalid(
            "cannot send a message to yourself".to_string(),
        ));
    }

    if content.trim().is_empty() && attachments.is_empty() {
        return Err(ServerError::Invalid(
            "a message needs text content or at least one attachment".to_string(),
        ));
    }

    if content.len() > MAX_CONTENT_BYTES {
        return Err(ServerError::Invalid(format!(
            "content exceeds {MAX_CONTENT_BYTES} bytes"
        )));
    }

    if attachments.len() > MAX_ATTACHMENTS {
        return Err(ServerError::Invalid(format!(
            "at most {MAX_ATTACHMENTS} attachments per message"
        )));
    }

    for attachment in attachments {
        if attachment.name.is_empty() || attachment.location_ref.is_empty() {
            return Err(ServerError::Invalid(
                "attachment metadata is incomplete".to_string(),
            ));
        }
        if attachment.size_bytes == 0 || attachment.size_bytes > MAX_ATTACHMENT_BYTES {
            return Err(ServerError::Invalid(format!(
                "attachment size must be between 1 and {MAX_ATTACHMENT_BYTES} bytes"
            )));
        }
    }

    Ok(())
}
