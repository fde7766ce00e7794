//! Typed rows the realtime core reads. Password hashes and profile extras
//! stay in SQL; only what the fan-out path needs crosses this boundary.

/// A chat user as seen by the WebSocket layer.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_active: bool,
    pub avatar_url: Option<String>,
}

/// The outcome of persisting one chat message. The row is the source of
/// truth; the broadcast envelope is built from this record.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: i64,
    pub created_at: String,
}
