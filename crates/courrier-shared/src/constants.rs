/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum ingested payload size in bytes (1 MiB), applies to message
/// bodies and attachment files alike
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// File extensions accepted for attachment uploads (lowercase, with dot)
pub const ALLOWED_ATTACHMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".txt"];

/// Relay queue carrying raw attachment bytes
pub const QUEUE_ATTACHMENTS: &str = "attachments";

/// Relay queue carrying chat notifications
pub const QUEUE_NOTIFICATIONS: &str = "notifications";

/// Realtime event name pushed to a recipient's live sessions
pub const EVENT_RECEIVE_MESSAGE: &str = "ReceiveMessage";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
