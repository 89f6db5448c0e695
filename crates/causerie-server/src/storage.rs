//! Async facade over the blocking message store.
//!
//! Every store call hops onto the blocking thread pool and races a
//! deadline, so no request handler can stall the event loop on SQLite and a
//! slow query surfaces as a retryable timeout instead of a hung connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;

use causerie_shared::message::Message;
use causerie_shared::types::{MessageId, UserId};
use causerie_store::{ConversationSummary, Database};

use crate::error::ServerError;

/// Shared handle to the message database.
///
/// The store itself is synchronous (one `rusqlite::Connection` behind a
/// mutex); concurrency control for racing state transitions lives in the
/// store's conditional updates, not here.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<Mutex<Database>>,
    op_timeout: Duration,
}

impl MessageService {
    pub fn new(db: Database, op_timeout: Duration) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            op_timeout,
        }
    }

    /// Run one blocking store operation under the configured deadline.
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, ServerError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> causerie_store::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&db)
        });

        match timeout(self.op_timeout, task).await {
            Err(_elapsed) => Err(ServerError::Timeout(op)),
            Ok(Err(join_err)) => Err(ServerError::Internal(format!(
                "storage task failed: {join_err}"
            ))),
            Ok(Ok(result)) => result.map_err(ServerError::from),
        }
    }

    pub async fn insert_message(&self, message: Message) -> Result<(), ServerError> {
        self.run("insert_message", move |db| db.insert_message(&message))
            .await
    }

    pub async fn get_message(&self, id: MessageId) -> Result<Message, ServerError> {
        self.run("get_message", move |db| db.get_message(id)).await
    }

    pub async fn conversation_page(
        &self,
        user: UserId,
        peer: UserId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, ServerError> {
        self.run("conversation_page", move |db| {
            db.conversation_page(user, peer, limit, before)
        })
        .await
    }

    pub async fn mark_read(
        &self,
        id: MessageId,
        reader: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, ServerError> {
        self.run("mark_read", move |db| db.mark_read(id, reader, at))
            .await
    }

    pub async fn mark_all_read(
        &self,
        reader: UserId,
        sender: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, ServerError> {
        self.run("mark_all_read", move |db| db.mark_all_read(reader, sender, at))
            .await
    }

    pub async fn soft_delete_message(
        &self,
        id: MessageId,
        at: DateTime<Utc>,
    ) -> Result<bool, ServerError> {
        self.run("soft_delete_message", move |db| db.soft_delete_message(id, at))
            .await
    }

    pub async fn conversation_summaries(
        &self,
        user: UserId,
    ) -> Result<Vec<ConversationSummary>, ServerError> {
        self.run("conversation_summaries", move |db| db.conversation_summaries(user))
            .await
    }

    pub async fn unread_total(&self, user: UserId) -> Result<u64, ServerError> {
        self.run("unread_total", move |db| db.unread_total(user)).await
    }

    pub async fn unread_from(&self, user: UserId, peer: UserId) -> Result<u64, ServerError> {
        self.run("unread_from", move |db| db.unread_from(user, peer))
            .await
    }

    pub async fn user_exists(&self, id: UserId) -> Result<bool, ServerError> {
        self.run("user_exists", move |db| db.user_exists(id)).await
    }
}
