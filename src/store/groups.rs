use super::StoreError;
use crate::db::DbPool;

/// Check whether a group exists.
pub fn group_exists(db: &DbPool, group_id: i64) -> Result<bool, StoreError> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let exists = conn.query_row(
        "SELECT COUNT(*) FROM groups WHERE id = ?1",
        rusqlite::params![group_id],
        |row| row.get::<_, i64>(0).map(|c| c > 0),
    )?;
    Ok(exists)
}

/// Check whether a user belongs to a group. The realtime core only ever
/// reads membership; joins and leaves are managed elsewhere.
pub fn is_member(db: &DbPool, user_id: i64, group_id: i64) -> Result<bool, StoreError> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let member = conn.query_row(
        "SELECT COUNT(*) FROM user_group WHERE user_id = ?1 AND group_id = ?2",
        rusqlite::params![user_id, group_id],
        |row| row.get::<_, i64>(0).map(|c| c > 0),
    )?;
    Ok(member)
}
