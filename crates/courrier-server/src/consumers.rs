//! Background consumers for the two relay queues.
//!
//! Both consumers inherit the relay's unconditional-acknowledge policy: a
//! malformed envelope or a failed side effect is logged and the envelope is
//! gone. Nothing here retries.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::{info, warn};

use courrier_relay::Consumer;
use courrier_shared::codec::{self, SymmetricKey};
use courrier_shared::constants::EVENT_RECEIVE_MESSAGE;
use courrier_shared::types::{AttachmentBlob, AttachmentEnvelope, ChatMessage};
use courrier_store::Database;

use crate::hub::SessionRegistry;

/// Encrypt incoming attachment bytes and persist them as a blob keyed by
/// the companion message id.
pub async fn run_attachment_consumer(
    consumer: Consumer,
    db: Arc<Mutex<Database>>,
    key: SymmetricKey,
) {
    consumer
        .run(move |payload| {
            let db = Arc::clone(&db);
            async move {
                let envelope: AttachmentEnvelope = serde_json::from_slice(&payload)
                    .context("malformed attachment envelope")?;

                if envelope.data.is_empty() {
                    warn!(id = %envelope.id, "attachment envelope carries no data, skipping");
                    return Ok(());
                }

                let sealed = codec::seal_raw(&key, &envelope.data)?;
                db.lock()
                    .map_err(|_| anyhow::anyhow!("store lock poisoned"))?
                    .insert_attachment(&AttachmentBlob {
                        id: envelope.id,
                        data: sealed,
                    })?;

                info!(id = %envelope.id, size = envelope.data.len(), "stored encrypted attachment");
                Ok(())
            }
        })
        .await;
}

/// Forward chat notifications to the recipient's live sessions.
pub async fn run_notification_consumer(consumer: Consumer, hub: SessionRegistry) {
    consumer
        .run(move |payload| {
            let hub = hub.clone();
            async move {
                let message: ChatMessage =
                    serde_json::from_slice(&payload).context("malformed message envelope")?;

                if message.sender_id.is_empty() || message.recipient_id.is_empty() {
                    warn!(id = %message.id, "notification without participants, skipping");
                    return Ok(());
                }

                let recipient = message.recipient_id.clone();
                let sender = message.sender_id.clone();
                hub.push(&recipient, EVENT_RECEIVE_MESSAGE, &(sender, message))
                    .await;
                Ok(())
            }
        })
        .await;
}
