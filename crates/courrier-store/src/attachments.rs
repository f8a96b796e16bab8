use rusqlite::params;
use uuid::Uuid;

use courrier_shared::types::AttachmentBlob;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Write an attachment blob exactly once. The id must match the
    /// companion message; a second write for the same id is rejected.
    pub fn insert_attachment(&self, blob: &AttachmentBlob) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO attachments (id, data) VALUES (?1, ?2)",
                params![blob.id.to_string(), blob.data],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Duplicate(blob.id)
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(())
    }

    pub fn get_attachment(&self, id: Uuid) -> Result<AttachmentBlob> {
        self.conn()
            .query_row(
                "SELECT id, data FROM attachments WHERE id = ?1",
                params![id.to_string()],
                row_to_blob,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

fn row_to_blob(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttachmentBlob> {
    let id_str: String = row.get(0)?;
    let data: Vec<u8> = row.get(1)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(AttachmentBlob { id, data })
}
