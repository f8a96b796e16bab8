//! Domain records and relay envelope types.
//!
//! These structs are the JSON wire contract between the pipeline, the relay
//! queues and connected realtime sessions, so every field is camelCase and
//! timestamps serialize as RFC 3339.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single chat message between two users.
///
/// The persisted `content` is always the sealed form
/// (`base64(encrypt(base64(compress(plaintext))))`); the plaintext form only
/// exists in the copies handed back to callers and pushed over the relay.
/// For attachment records the sealed plaintext is the original filename.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_attachment: bool,
}

impl ChatMessage {
    /// Build a new record with a fresh id and the current time. Both are
    /// set once here and never reassigned.
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
        is_attachment: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            is_attachment,
        }
    }

    /// Whether `user_id` is the sender or the recipient of this message.
    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }
}

/// Encrypted attachment bytes persisted alongside their companion message.
///
/// `id` equals the companion [`ChatMessage`] id; the blob is written exactly
/// once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentBlob {
    pub id: Uuid,
    pub data: Vec<u8>,
}

/// Relay envelope carrying raw attachment bytes to the attachment consumer.
///
/// On the wire the bytes travel base64-encoded: `{"id": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentEnvelope {
    pub id: Uuid,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}
