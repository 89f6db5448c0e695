//! Presence tracking.
//!
//! Maintains the in-memory map from user to live WebSocket connection: the
//! authoritative answer to "is this user online right now".  One registry
//! instance is created at startup and handed to the components that need it;
//! it is deliberately not a process global, so tests build isolated
//! registries.
//!
//! Presence is transient by design.  Nothing here is persisted; a process
//! restart empties the map and clients re-announce when they reconnect.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use causerie_shared::protocol::ServerEvent;
use causerie_shared::types::{ConnectionId, UserId};

/// Outbound half of one live WebSocket connection.
///
/// Cloning is cheap; all clones feed the same per-connection writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event for the connection's writer task.
    ///
    /// Returns `false` when the connection is already gone.  Pushes are
    /// best-effort everywhere they are used: durability was settled before
    /// any push, so a miss is logged by the caller and nothing else.
    pub fn push(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

struct PresenceEntry {
    handle: ConnectionHandle,
    last_seen_at: DateTime<Utc>,
}

/// Result of [`PresenceRegistry::announce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// A new mapping was installed (first announce, or a newer connection
    /// superseding an older one).  Callers broadcast the online transition.
    Registered,
    /// The same connection announced again; only `last_seen_at` moved.
    Refreshed,
}

/// Tracks which connection (if any) currently represents each user.
pub struct PresenceRegistry {
    entries: Mutex<HashMap<UserId, PresenceEntry>>,
}

impl PresenceRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register `handle` as the live connection for `user_id`.
    ///
    /// Last writer wins: a second device or tab replaces the first, which
    /// silently stops receiving pushes (single-active-session semantics).
    /// Announcing twice from the same connection is idempotent.
    pub async fn announce(&self, user_id: UserId, handle: ConnectionHandle) -> AnnounceOutcome {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();

        if let Some(existing) = entries.get_mut(&user_id) {
            if existing.handle.id() == handle.id() {
                existing.last_seen_at = now;
                return AnnounceOutcome::Refreshed;
            }
            debug!(
                user = %user_id,
                old_conn = %existing.handle.id(),
                new_conn = %handle.id(),
                "superseding existing connection"
            );
        }

        entries.insert(
            user_id,
            PresenceEntry {
                handle,
                last_seen_at: now,
            },
        );
        AnnounceOutcome::Registered
    }

    /// Current connection for `user_id`, if any.  Pure read.
    pub async fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.entries
            .lock()
            .await
            .get(&user_id)
            .map(|entry| entry.handle.clone())
    }

    /// Remove the entry owned by `connection_id` (reverse lookup).
    ///
    /// Called when a connection closes.  Returns the released user and
    /// their last-seen timestamp for the offline broadcast.  If the handle
    /// was already superseded by a newer announce, this is a no-op and
    /// returns `None` -- the user reconnected from elsewhere before the old
    /// connection's close fired.
    pub async fn release(&self, connection_id: ConnectionId) -> Option<(UserId, DateTime<Utc>)> {
        let mut entries = self.entries.lock().await;

        let user_id = entries
            .iter()
            .find(|(_, entry)| entry.handle.id() == connection_id)
            .map(|(user_id, _)| *user_id)?;

        let entry = entries.remove(&user_id)?;
        debug!(user = %user_id, conn = %connection_id, "released connection");
        Some((user_id, entry.last_seen_at))
    }

    /// Push `event` to `user_id` if they are online.
    ///
    /// Returns whether the event was handed to a live connection.  A stale
    /// handle is logged and swallowed here; it never fails the caller.
    pub async fn notify(&self, user_id: UserId, event: ServerEvent) -> bool {
        let Some(handle) = self.lookup(user_id).await else {
            return false;
        };

        if handle.push(event) {
            true
        } else {
            warn!(user = %user_id, conn = %handle.id(), "push to stale connection dropped");
            false
        }
    }

    /// Push `event` to every connection except `origin`.
    ///
    /// Used for the presence-changed fan-out, which goes to everyone
    /// connected rather than a filtered peer set.
    pub async fn broadcast_except(&self, origin: ConnectionId, event: ServerEvent) {
        let entries = self.entries.lock().await;
        for (user_id, entry) in entries.iter() {
            if entry.handle.id() == origin {
                continue;
            }
            if !entry.handle.push(event.clone()) {
                warn!(user = %user_id, conn = %entry.handle.id(), "broadcast to stale connection dropped");
            }
        }
    }

    /// Snapshot of every online user.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.entries.lock().await.keys().copied().collect()
    }

    /// Number of live connections.
    pub async fn online_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
