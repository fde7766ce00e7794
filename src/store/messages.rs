use chrono::Utc;

use super::StoreError;
use crate::db::models::MessageRecord;
use crate::db::DbPool;

/// Persist one chat message and return its row id and creation timestamp.
/// The caller builds the broadcast envelope from the returned record, so
/// every chat_message event on the wire corresponds to a committed row.
pub fn persist_message(
    db: &DbPool,
    content: &str,
    sender_id: i64,
    group_id: i64,
    message_type: &str,
) -> Result<MessageRecord, StoreError> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO messages (content, created_at, message_type, sender_id, group_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![content, created_at, message_type, sender_id, group_id],
    )?;

    Ok(MessageRecord {
        id: conn.last_insert_rowid(),
        created_at,
    })
}
