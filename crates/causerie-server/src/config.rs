//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use causerie_shared::constants::{DEFAULT_HISTORY_PAGE, DEFAULT_HTTP_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite message database.
    /// Env: `DATABASE_PATH`
    /// Default: `./causerie.db`
    pub database_path: PathBuf,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Causerie Node"`
    pub instance_name: String,

    /// Deadline for a single storage operation before it surfaces a
    /// retryable timeout instead of stalling the caller.
    /// Env: `STORAGE_TIMEOUT_SECS`
    /// Default: `5`
    pub storage_timeout: Duration,

    /// Default page size for history fetches when the client does not ask
    /// for one.
    /// Env: `HISTORY_PAGE_SIZE`
    /// Default: `50`
    pub history_page_size: u32,

    /// Sustained sends per second allowed per user over the socket.
    /// Env: `SEND_RATE`
    /// Default: `5.0`
    pub send_rate: f64,

    /// Burst capacity of the per-user send limiter.
    /// Env: `SEND_BURST`
    /// Default: `15.0`
    pub send_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./causerie.db"),
            instance_name: "Causerie Node".to_string(),
            storage_timeout: Duration::from_secs(5),
            history_page_size: DEFAULT_HISTORY_PAGE,
            send_rate: 5.0,
            send_burst: 15.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(val) = std::env::var("STORAGE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.storage_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid STORAGE_TIMEOUT_SECS, using default"
                ),
            }
        }

        if let Ok(val) = std::env::var("HISTORY_PAGE_SIZE") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.history_page_size = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid HISTORY_PAGE_SIZE, using default"
                ),
            }
        }

        if let Ok(val) = std::env::var("SEND_RATE") {
            match val.parse::<f64>() {
                Ok(rate) if rate > 0.0 => config.send_rate = rate,
                _ => tracing::warn!(value = %val, "Invalid SEND_RATE, using default"),
            }
        }

        if let Ok(val) = std::env::var("SEND_BURST") {
            match val.parse::<f64>() {
                Ok(burst) if burst >= 1.0 => config.send_burst = burst,
                _ => tracing::warn!(value = %val, "Invalid SEND_BURST, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.history_page_size, 50);
        assert_eq!(config.storage_timeout, Duration::from_secs(5));
    }
}
