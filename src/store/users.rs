use rusqlite::OptionalExtension;

use super::StoreError;
use crate::db::models::User;
use crate::db::DbPool;

/// Look up a user by username. Returns None when no such user exists.
pub fn find_by_username(db: &DbPool, username: &str) -> Result<Option<User>, StoreError> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let user = conn
        .query_row(
            "SELECT id, username, is_active, avatar_url FROM users WHERE username = ?1",
            rusqlite::params![username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    is_active: row.get::<_, i64>(2)? != 0,
                    avatar_url: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}
