//! Ingest pipeline: validate -> seal -> persist -> relay.
//!
//! Each request moves through the stages in that fixed order. A failure
//! before the store write aborts with no side effects at all; a publish
//! failure after the store write leaves a durable, unrelayed record --
//! the message is still retrievable via history even if realtime delivery
//! never fires. There are no retries within a request; callers resubmit.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use courrier_relay::Broker;
use courrier_shared::codec::{self, SymmetricKey};
use courrier_shared::constants::{
    ALLOWED_ATTACHMENT_EXTENSIONS, QUEUE_ATTACHMENTS, QUEUE_NOTIFICATIONS,
};
use courrier_shared::types::{AttachmentEnvelope, ChatMessage};
use courrier_store::Database;

use crate::error::ServerError;

/// Stateless orchestrator; safe for unlimited concurrent requests. All
/// state lives in the injected store, broker and key handles.
#[derive(Clone)]
pub struct IngestPipeline {
    db: Arc<Mutex<Database>>,
    broker: Arc<Broker>,
    key: SymmetricKey,
    max_payload_size: usize,
}

impl IngestPipeline {
    pub fn new(
        db: Arc<Mutex<Database>>,
        broker: Arc<Broker>,
        key: SymmetricKey,
        max_payload_size: usize,
    ) -> Self {
        Self {
            db,
            broker,
            key,
            max_payload_size,
        }
    }

    /// Ingest a plain chat message.
    ///
    /// Returns the plaintext-bearing record handed back to the caller; the
    /// stored copy only ever carries the sealed content.
    pub async fn send_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
    ) -> Result<ChatMessage, ServerError> {
        validate_participants(sender_id, recipient_id)?;
        if content.is_empty() {
            return Err(ServerError::Validation("Message is empty".to_string()));
        }
        self.check_payload_size(content.len())?;

        let sealed = codec::seal(&self.key, content.as_bytes())?;
        let record = ChatMessage::new(sender_id, recipient_id, sealed, false);

        self.insert_message(&record)?;

        let mut delivered = record;
        delivered.content = content.to_string();

        let envelope = Bytes::from(serde_json::to_vec(&delivered)?);
        self.broker.publish(QUEUE_NOTIFICATIONS, envelope)?;

        tracing::info!(id = %delivered.id, "message ingested");
        Ok(delivered)
    }

    /// Ingest an attachment: the sealed record carries the original
    /// filename, the raw bytes travel to the attachment consumer for
    /// encryption and blob storage.
    pub async fn ingest_attachment(
        &self,
        sender_id: &str,
        recipient_id: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<ChatMessage, ServerError> {
        validate_participants(sender_id, recipient_id)?;
        if data.is_empty() {
            return Err(ServerError::Validation("No file uploaded".to_string()));
        }
        self.check_payload_size(data.len())?;
        validate_extension(file_name)?;

        let sealed = codec::seal(&self.key, file_name.as_bytes())?;
        let record = ChatMessage::new(sender_id, recipient_id, sealed, true);

        self.insert_message(&record)?;

        let file_envelope = Bytes::from(serde_json::to_vec(&AttachmentEnvelope {
            id: record.id,
            data: data.to_vec(),
        })?);

        let mut delivered = record;
        delivered.content = file_name.to_string();
        let notify_envelope = Bytes::from(serde_json::to_vec(&delivered)?);

        // Both publishes proceed independently; neither rolls back the
        // already-durable store write.
        let file_result = self.broker.publish(QUEUE_ATTACHMENTS, file_envelope);
        let notify_result = self.broker.publish(QUEUE_NOTIFICATIONS, notify_envelope);
        file_result?;
        notify_result?;

        tracing::info!(id = %delivered.id, size = data.len(), "attachment ingested");
        Ok(delivered)
    }

    fn insert_message(&self, record: &ChatMessage) -> Result<(), ServerError> {
        self.db
            .lock()
            .map_err(|_| ServerError::Internal("store lock poisoned".to_string()))?
            .insert_message(record)?;
        Ok(())
    }

    fn check_payload_size(&self, size: usize) -> Result<(), ServerError> {
        if size > self.max_payload_size {
            return Err(ServerError::Validation(format!(
                "Payload too large: {} bytes (max {})",
                size, self.max_payload_size
            )));
        }
        Ok(())
    }
}

fn validate_participants(sender_id: &str, recipient_id: &str) -> Result<(), ServerError> {
    if sender_id.trim().is_empty() || recipient_id.trim().is_empty() {
        return Err(ServerError::Validation(
            "Sender and recipient ids are required".to_string(),
        ));
    }
    Ok(())
}

fn validate_extension(file_name: &str) -> Result<(), ServerError> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default();

    if extension.is_empty() || !ALLOWED_ATTACHMENT_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ServerError::Validation(format!(
            "Invalid file type. Allowed: {}",
            ALLOWED_ATTACHMENT_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courrier_shared::constants::{EVENT_RECEIVE_MESSAGE, MAX_PAYLOAD_SIZE};

    use crate::consumers::{run_attachment_consumer, run_notification_consumer};
    use crate::hub::SessionRegistry;

    use super::*;

    fn test_setup() -> (IngestPipeline, Arc<Mutex<Database>>, Arc<Broker>) {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let broker = Arc::new(Broker::new());
        broker.declare(QUEUE_ATTACHMENTS);
        broker.declare(QUEUE_NOTIFICATIONS);

        let key = codec::generate_symmetric_key();
        let pipeline = IngestPipeline::new(
            Arc::clone(&db),
            Arc::clone(&broker),
            key,
            MAX_PAYLOAD_SIZE,
        );
        (pipeline, db, broker)
    }

    fn message_count(db: &Arc<Mutex<Database>>) -> u32 {
        db.lock()
            .unwrap()
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn returned_record_is_plaintext_stored_record_is_sealed() {
        let (pipeline, db, _broker) = test_setup();

        let delivered = pipeline.send_message("u1", "u2", "hello").await.unwrap();
        assert_eq!(delivered.content, "hello");

        let stored = db.lock().unwrap().get_message_by_id(delivered.id).unwrap();
        assert_ne!(stored.content, "hello");
        assert_eq!(
            codec::open(&pipeline.key, &stored.content).unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn oversized_message_rejected_without_side_effects() {
        let (pipeline, db, broker) = test_setup();
        let oversized = "x".repeat(MAX_PAYLOAD_SIZE + 1);

        let result = pipeline.send_message("u1", "u2", &oversized).await;
        assert!(matches!(result, Err(ServerError::Validation(_))));

        // No store write, no publish.
        assert_eq!(message_count(&db), 0);
        assert_eq!(broker.depth(QUEUE_NOTIFICATIONS).unwrap(), 0);
    }

    #[tokio::test]
    async fn oversized_attachment_rejected_without_side_effects() {
        let (pipeline, db, broker) = test_setup();
        let data = Bytes::from(vec![0u8; MAX_PAYLOAD_SIZE + 1]);

        let result = pipeline
            .ingest_attachment("u1", "u2", "notes.txt", data)
            .await;
        assert!(matches!(result, Err(ServerError::Validation(_))));

        assert_eq!(message_count(&db), 0);
        assert_eq!(broker.depth(QUEUE_ATTACHMENTS).unwrap(), 0);
        assert_eq!(broker.depth(QUEUE_NOTIFICATIONS).unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_message_and_missing_ids_rejected() {
        let (pipeline, _db, _broker) = test_setup();

        assert!(matches!(
            pipeline.send_message("u1", "u2", "").await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            pipeline.send_message("", "u2", "hi").await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            pipeline.send_message("u1", " ", "hi").await,
            Err(ServerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn extension_allow_list_enforced() {
        let (pipeline, _db, _broker) = test_setup();
        let data = Bytes::from_static(b"content");

        assert!(matches!(
            pipeline
                .ingest_attachment("u1", "u2", "malware.exe", data.clone())
                .await,
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            pipeline
                .ingest_attachment("u1", "u2", "no_extension", data.clone())
                .await,
            Err(ServerError::Validation(_))
        ));

        for name in ["a.pdf", "b.doc", "c.docx", "d.txt", "e.TXT"] {
            pipeline
                .ingest_attachment("u1", "u2", name, data.clone())
                .await
                .unwrap_or_else(|e| panic!("{name} should be accepted: {e}"));
        }
    }

    #[tokio::test]
    async fn send_message_end_to_end() {
        let (pipeline, db, broker) = test_setup();
        let hub = SessionRegistry::new();

        let notifications = tokio::spawn(run_notification_consumer(
            broker.consume(QUEUE_NOTIFICATIONS).unwrap(),
            hub.clone(),
        ));

        // Recipient is connected before the send.
        let mut session = hub.connect("u2").await;

        let delivered = pipeline.send_message("u1", "u2", "hello").await.unwrap();
        assert_eq!(delivered.content, "hello");

        // Realtime fanout carries (senderId, Message) under "ReceiveMessage".
        let frame = tokio::time::timeout(Duration::from_secs(1), session.rx.recv())
            .await
            .expect("push should arrive")
            .unwrap();
        assert!(frame.contains(EVENT_RECEIVE_MESSAGE));
        assert!(frame.contains("\"u1\""));
        assert!(frame.contains("hello"));

        // Stored record opens back to the plaintext.
        let stored = db.lock().unwrap().get_message_by_id(delivered.id).unwrap();
        assert_eq!(codec::open(&pipeline.key, &stored.content).unwrap(), b"hello");

        // Both conversation directions return the identical single record.
        let ab = db.lock().unwrap().get_conversation("u1", "u2").unwrap();
        let ba = db.lock().unwrap().get_conversation("u2", "u1").unwrap();
        assert_eq!(ab.len(), 1);
        assert_eq!(ab, ba);

        broker.shutdown();
        notifications.await.unwrap();
    }

    #[tokio::test]
    async fn attachment_end_to_end() {
        let (pipeline, db, broker) = test_setup();
        let hub = SessionRegistry::new();
        let key = pipeline.key;

        let attachments = tokio::spawn(run_attachment_consumer(
            broker.consume(QUEUE_ATTACHMENTS).unwrap(),
            Arc::clone(&db),
            key,
        ));
        let notifications = tokio::spawn(run_notification_consumer(
            broker.consume(QUEUE_NOTIFICATIONS).unwrap(),
            hub.clone(),
        ));

        let raw = Bytes::from_static(b"%PDF-1.4 fake report");
        let delivered = pipeline
            .ingest_attachment("u1", "u2", "report.pdf", raw.clone())
            .await
            .unwrap();
        assert_eq!(delivered.content, "report.pdf");
        assert!(delivered.is_attachment);

        // The consumer stores the blob encrypted; open_raw recovers the bytes.
        let blob = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Ok(blob) = db.lock().unwrap().get_attachment(delivered.id) {
                    return blob;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("attachment should be stored");

        assert_ne!(blob.data, raw.to_vec());
        assert_eq!(codec::open_raw(&key, &blob.data).unwrap(), raw.to_vec());

        // The companion message record exists with the sealed filename.
        let stored = db.lock().unwrap().get_message_by_id(delivered.id).unwrap();
        assert!(stored.is_attachment);
        assert_eq!(
            codec::open(&key, &stored.content).unwrap(),
            b"report.pdf"
        );

        broker.shutdown();
        attachments.await.unwrap();
        notifications.await.unwrap();
    }
}
