use axum::Router;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router. The only surfaces this server exposes are the chat
/// WebSocket (auth via query param, not JWT header) and a health probe;
/// account, group, and upload endpoints live in the companion CRUD service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/chat", axum::routing::get(ws_handler::chat_ws_upgrade))
        .route("/health", axum::routing::get(health_check))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
