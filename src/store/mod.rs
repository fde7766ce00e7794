//! Storage collaborators for the realtime core: user resolution, group
//! membership checks, and message persistence. All functions are synchronous
//! rusqlite calls; async callers route them through spawn_blocking.

pub mod groups;
pub mod messages;
pub mod users;

/// Error type shared by store operations. Must be Send + Sync so results can
/// cross a spawn_blocking boundary.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
