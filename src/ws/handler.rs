use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;
use thiserror::Error;

use crate::auth::jwt;
use crate::db::models::User;
use crate::state::AppState;
use crate::store;
use crate::ws::actor;

/// Query parameters for the chat WebSocket. Both are supplied out of band:
/// GET /ws/chat?token=<JWT>&group_id=<id>
#[derive(Debug, Deserialize)]
pub struct ChatWsQuery {
    pub token: Option<String>,
    pub group_id: Option<String>,
}

/// WebSocket close codes for rejected connections:
/// 4001 = missing/invalid credential
/// 4002 = inactive user
/// 4003 = missing/invalid group id
/// 4004 = group not found
/// 4005 = not a member of the group
const CLOSE_BAD_TOKEN: u16 = 4001;
const CLOSE_INACTIVE_USER: u16 = 4002;
const CLOSE_BAD_GROUP_ID: u16 = 4003;
const CLOSE_GROUP_NOT_FOUND: u16 = 4004;
const CLOSE_NOT_A_MEMBER: u16 = 4005;
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Why a connection attempt was rejected before registration. Each variant
/// maps to a close code plus a human-readable reason on the close frame.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("missing auth token")]
    MissingToken,
    #[error("invalid auth token")]
    InvalidToken,
    #[error("user not found")]
    UserNotFound,
    #[error("user account is disabled")]
    InactiveUser,
    #[error("missing group id")]
    MissingGroupId,
    #[error("invalid group id")]
    InvalidGroupId,
    #[error("group not found")]
    GroupNotFound,
    #[error("user is not a member of this group")]
    NotAMember,
    #[error("internal error")]
    Internal,
}

impl ConnectError {
    fn close_code(&self) -> u16 {
        match self {
            ConnectError::MissingToken
            | ConnectError::InvalidToken
            | ConnectError::UserNotFound => CLOSE_BAD_TOKEN,
            ConnectError::InactiveUser => CLOSE_INACTIVE_USER,
            ConnectError::MissingGroupId | ConnectError::InvalidGroupId => CLOSE_BAD_GROUP_ID,
            ConnectError::GroupNotFound => CLOSE_GROUP_NOT_FOUND,
            ConnectError::NotAMember => CLOSE_NOT_A_MEMBER,
            ConnectError::Internal => CLOSE_INTERNAL_ERROR,
        }
    }
}

/// GET /ws/chat?token=JWT&group_id=N
/// WebSocket upgrade endpoint for group chat. Validation runs before the
/// session starts; a rejected connection is upgraded, closed with a
/// distinguishing code and reason, and never registered — so no join
/// broadcast is ever sent for it.
pub async fn chat_ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<ChatWsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match validate_connect(&state, &params).await {
        Ok((user, group_id)) => {
            tracing::info!(
                user_id = user.id,
                username = %user.username,
                group_id,
                "WebSocket connection accepted"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, user, group_id))
        }
        Err(err) => {
            tracing::warn!(
                close_code = err.close_code(),
                reason = %err,
                "WebSocket connection rejected"
            );
            ws.on_upgrade(move |socket| reject(socket, err))
        }
    }
}

/// Entry validation, in order: credential, then group resolution, then
/// membership. Returned as an explicit error kind rather than an unwind so
/// the caller decides close-with-reason vs. proceed.
async fn validate_connect(
    state: &AppState,
    params: &ChatWsQuery,
) -> Result<(User, i64), ConnectError> {
    let token = params.token.as_deref().ok_or(ConnectError::MissingToken)?;
    let claims = jwt::validate_access_token(&state.jwt_secret, token)
        .map_err(|_| ConnectError::InvalidToken)?;

    let group_id: i64 = params
        .group_id
        .as_deref()
        .ok_or(ConnectError::MissingGroupId)?
        .parse()
        .map_err(|_| ConnectError::InvalidGroupId)?;

    let db = state.db.clone();
    let username = claims.sub;
    tokio::task::spawn_blocking(move || {
        let user = store::users::find_by_username(&db, &username)
            .map_err(|_| ConnectError::Internal)?
            .ok_or(ConnectError::UserNotFound)?;
        if !user.is_active {
            return Err(ConnectError::InactiveUser);
        }

        if !store::groups::group_exists(&db, group_id).map_err(|_| ConnectError::Internal)? {
            return Err(ConnectError::GroupNotFound);
        }
        if !store::groups::is_member(&db, user.id, group_id).map_err(|_| ConnectError::Internal)? {
            return Err(ConnectError::NotAMember);
        }

        Ok((user, group_id))
    })
    .await
    .map_err(|_| ConnectError::Internal)?
}

/// Upgrade the connection, then immediately close with the rejection reason.
async fn reject(mut socket: WebSocket, err: ConnectError) {
    let close_frame = CloseFrame {
        code: err.close_code(),
        reason: err.to_string().into(),
    };
    let _ = socket.send(Message::Close(Some(close_frame))).await;
}
