//! # causerie-store
//!
//! Durable message storage for the Causerie server, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every operation the
//! delivery core needs: message CRUD, the atomic conditional updates that
//! guard read-receipt races, and the read-side conversation projection.
//! Async callers put the handle behind `spawn_blocking`; the store itself
//! never touches a runtime.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
