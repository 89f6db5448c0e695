/// Application name
pub const APP_NAME: &str = "Causerie";

/// How long after creation a sender may delete their own message (seconds)
pub const DELETE_RETENTION_SECS: i64 = 3600;

/// Maximum text content length in bytes
pub const MAX_CONTENT_BYTES: usize = 8192;

/// Maximum number of attachments per message
pub const MAX_ATTACHMENTS: usize = 5;

/// Maximum size of a single attachment in bytes (10 MiB)
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Default page size for message history fetches
pub const DEFAULT_HISTORY_PAGE: u32 = 50;

/// Upper bound a client may request for one history page
pub const MAX_HISTORY_PAGE: u32 = 200;

/// Default HTTP/WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
