//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `users` (owned by the account subsystem,
//! read here for existence checks and display names) and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    username   TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
-- rowid doubles as the insertion-order tie-breaker: conversation order is
-- (created_at, rowid), never wall-clock alone.
CREATE TABLE IF NOT EXISTS messages (
    id           TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    sender_id    TEXT NOT NULL,              -- FK -> users(id)
    receiver_id  TEXT NOT NULL,              -- FK -> users(id)
    content      TEXT NOT NULL DEFAULT '',
    attachments  TEXT NOT NULL DEFAULT '[]', -- JSON array, insertion order
    created_at   TEXT NOT NULL,              -- ISO-8601
    delivered_at TEXT NOT NULL,              -- set at creation (= stored)
    read_at      TEXT,                       -- NULL until receiver acks
    status       TEXT NOT NULL DEFAULT 'delivered',
    deleted      INTEGER NOT NULL DEFAULT 0, -- boolean 0/1 (soft delete)
    deleted_at   TEXT,

    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_sender_ts
    ON messages(sender_id, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_messages_receiver_ts
    ON messages(receiver_id, created_at DESC);

-- Unread scans: receiver's messages with read_at IS NULL.
CREATE INDEX IF NOT EXISTS idx_messages_unread
    ON messages(receiver_id, sender_id, read_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
