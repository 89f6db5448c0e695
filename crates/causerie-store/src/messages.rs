//! Message CRUD and the conditional updates that guard read-receipt races.
//!
//! Every state transition on a message is a single SQL statement with its
//! precondition in the WHERE clause, so two racing callers resolve inside
//! SQLite: one observes the transition, the other observes zero affected
//! rows.

use chrono::{DateTime, Utc};
use rusqlite::params;

use causerie_shared::message::{Message, MessageStatus};
use causerie_shared::types::{MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, attachments, \
     created_at, delivered_at, read_at, status, deleted, deleted_at";

impl Database {
    /// Persist a freshly created message.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, attachments,
                                   created_at, delivered_at, read_at, status, deleted, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.content,
                serde_json::to_string(&message.attachments)?,
                message.created_at.to_rfc3339(),
                message.delivered_at.to_rfc3339(),
                message.read_at.map(|t| t.to_rfc3339()),
                message.status.as_str(),
                message.deleted as i64,
                message.deleted_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Fetch a message by id, deleted or not.  Policy checks (who may see
    /// or delete it) belong to the caller.
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// One page of the conversation between `user` and `peer`.
    ///
    /// The query walks newest-first (created_at, then rowid so equal
    /// timestamps keep insertion order) and the page is reversed before
    /// returning, so callers receive chronologically ascending messages
    /// ready for display.  `before` is an exclusive cursor: pass the oldest
    /// message id of the previous page to continue backwards.
    pub fn conversation_page(
        &self,
        user: UserId,
        peer: UserId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE deleted = 0
               AND ((sender_id = ?1 AND receiver_id = ?2)
                 OR (sender_id = ?2 AND receiver_id = ?1))
               AND (?3 IS NULL
                 OR rowid < (SELECT rowid FROM messages WHERE id = ?3))
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4"
        ))?;

        let rows = stmt.query_map(
            params![
                user.to_string(),
                peer.to_string(),
                before.map(|id| id.to_string()),
                limit,
            ],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }

    /// Atomically transition one message to read.
    ///
    /// Returns `true` when this call performed the transition.  `false`
    /// means the precondition failed -- no such message, `reader` is not the
    /// receiver, already read, or deleted -- which callers treat as a benign
    /// no-op.
    pub fn mark_read(
        &self,
        id: MessageId,
        reader: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET read_at = ?3, status = ?4
             WHERE id = ?1 AND receiver_id = ?2 AND read_at IS NULL AND deleted = 0",
            params![
                id.to_string(),
                reader.to_string(),
                at.to_rfc3339(),
                MessageStatus::Read.as_str(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Atomically transition every unread message from `sender` to `reader`.
    ///
    /// Returns how many messages changed state.  A single UPDATE, so racing
    /// callers cannot double-count any message.
    pub fn mark_all_read(
        &self,
        reader: UserId,
        sender: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let affected = self.conn().execute(
            "UPDATE messages SET read_at = ?3, status = ?4
             WHERE receiver_id = ?1 AND sender_id = ?2 AND read_at IS NULL AND deleted = 0",
            params![
                reader.to_string(),
                sender.to_string(),
                at.to_rfc3339(),
                MessageStatus::Read.as_str(),
            ],
        )?;
        Ok(affected as u64)
    }

    /// Soft-delete a message.  Returns `false` when it was already deleted
    /// (or never existed).  Sender/retention policy is enforced by the
    /// caller before this point; the conditional update only guards the
    /// race between two deletes.
    pub fn soft_delete_message(&self, id: MessageId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET deleted = 1, deleted_at = ?2
             WHERE id = ?1 AND deleted = 0",
            params![id.to_string(), at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: String = row.get(2)?;
    let content: String = row.get(3)?;
    let attachments_json: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let delivered_str: String = row.get(6)?;
    let read_str: Option<String> = row.get(7)?;
    let status_str: String = row.get(8)?;
    let deleted: bool = row.get(9)?;
    let deleted_str: Option<String> = row.get(10)?;

    Ok(Message {
        id: MessageId(parse_uuid(&id_str, 0)?),
        sender_id: UserId(parse_uuid(&sender_str, 1)?),
        receiver_id: UserId(parse_uuid(&receiver_str, 2)?),
        content,
        attachments: serde_json::from_str(&attachments_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: parse_ts(&created_str, 5)?,
        delivered_at: parse_ts(&delivered_str, 6)?,
        read_at: read_str.as_deref().map(|s| parse_ts(s, 7)).transpose()?,
        status: MessageStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                format!("unknown message status: {status_str}").into(),
            )
        })?,
        deleted,
        deleted_at: deleted_str.as_deref().map(|s| parse_ts(s, 10)).transpose()?,
    })
}

pub(crate) fn parse_uuid(s: &str, col: usize) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                col,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
