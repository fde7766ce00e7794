pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use tokio::sync::mpsc;

/// Type alias for the sender half of a connection's outbound channel.
/// Other parts of the system can clone this to push frames to a specific
/// client; the receiving end is owned by that connection's writer task.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;
