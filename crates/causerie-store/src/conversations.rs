//! The read-side conversation projection.
//!
//! Answers "for user U, list every conversation partner, their latest
//! message, and how many of their messages are unread" with fresh queries
//! against the `messages` table.  Nothing here mutates state, so the
//! projection is safe to run concurrently with writes; a message committed
//! mid-scan may or may not appear, and clients reconcile through live
//! pushes or a re-query.

use rusqlite::params;

use causerie_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::messages::{parse_uuid, row_to_message};
use crate::models::ConversationSummary;

impl Database {
    /// Every conversation `user` participates in, most recently active
    /// first.
    ///
    /// The representative message per peer is the maximum of
    /// `(created_at, rowid)` -- equal timestamps fall back to insertion
    /// order, never wall-clock ties.  Soft-deleted messages are invisible
    /// to the projection.
    pub fn conversation_summaries(&self, user: UserId) -> Result<Vec<ConversationSummary>> {
        let user_str = user.to_string();

        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, content, attachments,
                    created_at, delivered_at, read_at, status, deleted, deleted_at
             FROM (
                 SELECT m.*, m.rowid AS insertion_order, ROW_NUMBER() OVER (
                     PARTITION BY CASE WHEN m.sender_id = ?1
                                       THEN m.receiver_id ELSE m.sender_id END
                     ORDER BY m.created_at DESC, m.rowid DESC
                 ) AS rn
                 FROM messages m
                 WHERE m.deleted = 0
                   AND (m.sender_id = ?1 OR m.receiver_id = ?1)
             )
             WHERE rn = 1
             ORDER BY created_at DESC, insertion_order DESC",
        )?;

        let rows = stmt.query_map(params![user_str], row_to_message)?;

        let mut last_messages = Vec::new();
        for row in rows {
            last_messages.push(row?);
        }

        // One grouped scan for every per-peer unread count.
        let mut stmt = self.conn().prepare(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND read_at IS NULL AND deleted = 0
             GROUP BY sender_id",
        )?;
        let rows = stmt.query_map(params![user_str], |row| {
            let sender_str: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            Ok((UserId(parse_uuid(&sender_str, 0)?), count))
        })?;

        let mut unread = std::collections::HashMap::new();
        for row in rows {
            let (sender, count) = row?;
            unread.insert(sender, count);
        }

        let mut summaries = Vec::with_capacity(last_messages.len());
        for message in last_messages {
            let peer_id = if message.sender_id == user {
                message.receiver_id
            } else {
                message.sender_id
            };
            let peer = self.get_user(peer_id)?;

            summaries.push(ConversationSummary {
                unread_count: unread.get(&peer_id).copied().unwrap_or(0),
                peer,
                last_message: message,
            });
        }

        Ok(summaries)
    }

    /// Total unread messages addressed to `user`, across all peers.
    pub fn unread_total(&self, user: UserId) -> Result<u64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND read_at IS NULL AND deleted = 0",
            params![user.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Unread messages addressed to `user` from one specific peer.
    pub fn unread_from(&self, user: UserId, peer: UserId) -> Result<u64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND sender_id = ?2 AND read_at IS NULL AND deleted = 0",
            params![user.to_string(), peer.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
