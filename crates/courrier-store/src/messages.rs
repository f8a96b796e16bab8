use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use uuid::Uuid;

use courrier_shared::types::ChatMessage;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert a single message record. The id must already be assigned;
    /// inserting an existing id fails with [`StoreError::Duplicate`].
    pub fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content, timestamp, is_attachment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.sender_id,
                    message.recipient_id,
                    message.content,
                    encode_timestamp(&message.timestamp),
                    message.is_attachment as i32,
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Duplicate(message.id)
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(())
    }

    pub fn get_message_by_id(&self, id: Uuid) -> Result<ChatMessage> {
        self.conn()
            .query_row(
                "SELECT id, sender_id, recipient_id, content, timestamp, is_attachment
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Every message exchanged between `user_a` and `user_b`, in either
    /// direction, ascending by timestamp. Ties keep insertion order (rowid).
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, recipient_id, content, timestamp, is_attachment
             FROM messages
             WHERE (sender_id = ?1 AND recipient_id = ?2)
                OR (sender_id = ?2 AND recipient_id = ?1)
             ORDER BY timestamp ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![user_a, user_b], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

/// Fixed microsecond width keeps text ordering equal to chronological
/// ordering for the `ORDER BY timestamp` above.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let id_str: String = row.get(0)?;
    let sender_id: String = row.get(1)?;
    let recipient_id: String = row.get(2)?;
    let content: String = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let is_attachment_int: i32 = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ChatMessage {
        id,
        sender_id,
        recipient_id,
        content,
        timestamp,
        is_attachment: is_attachment_int != 0,
    })
}
