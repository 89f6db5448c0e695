//! # causerie-shared
//!
//! Types shared between the Causerie server and its clients: identifier
//! newtypes, the WebSocket event contract, and protocol-level constants.
//!
//! Everything here is plain data.  The crates that do work
//! (`causerie-store`, `causerie-server`) depend on this one, never the
//! other way around.

pub mod constants;
pub mod message;
pub mod protocol;
pub mod types;

pub use message::{Attachment, AttachmentKind, Message, MessageStatus};
pub use protocol::{ClientEvent, PresenceStatus, ServerEvent};
pub use types::{ConnectionId, MessageId, UserId};
