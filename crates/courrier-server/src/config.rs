//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use courrier_shared::codec::SymmetricKey;
use courrier_shared::constants::MAX_PAYLOAD_SIZE;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DB_PATH`
    /// Default: `./courrier.db`
    pub db_path: PathBuf,

    /// Symmetric content key (hex-encoded, 64 chars).
    /// Env: `COURRIER_KEY`
    /// Default: all-zeros (development only).
    pub master_key: SymmetricKey,

    /// Maximum ingested payload size in bytes (messages and attachments).
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: PathBuf::from("./courrier.db"),
            master_key: [0u8; 32],
            max_payload_size: MAX_PAYLOAD_SIZE,
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
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        match std::env::var("COURRIER_KEY") {
            Ok(hex_key) => match parse_hex_key(&hex_key) {
                Ok(key) => config.master_key = key,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid COURRIER_KEY, using default (dev-only)");
                }
            },
            Err(_) => {
                tracing::warn!("COURRIER_KEY not set, using all-zeros key (dev-only)");
            }
        }

        config
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("db_path", &self.db_path)
            .field("master_key", &"<redacted>")
            .field("max_payload_size", &self.max_payload_size)
            .finish()
    }
}

/// Parse a 64-character hex string into a 32-byte key.
fn parse_hex_key(hex_key: &str) -> Result<SymmetricKey, String> {
    let hex_key = hex_key.trim();
    if hex_key.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_key.len()));
    }

    let bytes = hex::decode(hex_key).map_err(|e| format!("invalid hex: {e}"))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
