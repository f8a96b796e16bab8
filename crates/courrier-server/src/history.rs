//! Conversation fetch with bounded-parallel content opening.

use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt, TryStreamExt};

use courrier_shared::codec::{self, SymmetricKey};
use courrier_shared::types::ChatMessage;
use courrier_store::Database;

use crate::error::ServerError;

/// How many sealed records are opened concurrently while serving history.
/// Fixed regardless of conversation length.
const OPEN_PARALLELISM: usize = 2;

/// Fetch the conversation between two users with every record's content
/// opened back to plaintext.
///
/// Decryption runs through a bounded, order-preserving buffer: each result
/// lands in its original index slot, so the returned sequence stays in
/// ascending timestamp order no matter which open finishes first.
pub async fn fetch_conversation(
    db: &Arc<Mutex<Database>>,
    key: &SymmetricKey,
    user_a: &str,
    user_b: &str,
) -> Result<Vec<ChatMessage>, ServerError> {
    let records = db
        .lock()
        .map_err(|_| ServerError::Internal("store lock poisoned".to_string()))?
        .get_conversation(user_a, user_b)?;

    let key = *key;
    stream::iter(records.into_iter().map(move |mut message| async move {
        let plaintext = codec::open(&key, &message.content)?;
        message.content = String::from_utf8(plaintext)
            .map_err(courrier_shared::CodecError::from)?;
        Ok::<_, ServerError>(message)
    }))
    .buffered(OPEN_PARALLELISM)
    .try_collect()
    .await
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn sealed_message(
        key: &SymmetricKey,
        sender: &str,
        recipient: &str,
        text: &str,
        offset_secs: i64,
        is_attachment: bool,
    ) -> ChatMessage {
        let sealed = codec::seal(key, text.as_bytes()).unwrap();
        let mut msg = ChatMessage::new(sender, recipient, sealed, is_attachment);
        msg.timestamp = Utc::now() + Duration::seconds(offset_secs);
        msg
    }

    #[tokio::test]
    async fn conversation_is_opened_in_ascending_order() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let key = codec::generate_symmetric_key();

        let m1 = sealed_message(&key, "u1", "u2", "first", 0, false);
        let m2 = sealed_message(&key, "u2", "u1", "second", 1, false);
        let m3 = sealed_message(&key, "u1", "u2", "report.pdf", 2, true);

        // Insert out of order.
        {
            let db = db.lock().unwrap();
            db.insert_message(&m2).unwrap();
            db.insert_message(&m3).unwrap();
            db.insert_message(&m1).unwrap();
        }

        let history = fetch_conversation(&db, &key, "u1", "u2").await.unwrap();

        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "report.pdf"]);
        assert!(history[2].is_attachment);
    }

    #[tokio::test]
    async fn empty_conversation_is_empty() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let key = codec::generate_symmetric_key();

        let history = fetch_conversation(&db, &key, "u1", "u2").await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn wrong_key_surfaces_a_codec_error() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let key = codec::generate_symmetric_key();
        let other_key = codec::generate_symmetric_key();

        let msg = sealed_message(&key, "u1", "u2", "secret", 0, false);
        db.lock().unwrap().insert_message(&msg).unwrap();

        let result = fetch_conversation(&db, &other_key, "u1", "u2").await;
        assert!(matches!(result, Err(ServerError::Codec(_))));
    }
}
