use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::db::models::User;
use crate::state::AppState;
use crate::store;
use crate::ws::broadcast::{broadcast_to_group, send_to_connection};
use crate::ws::protocol::{
    self, ClientEnvelope, MessagePayload, SenderInfo, ServerEnvelope, MAX_CONTENT_LENGTH,
};
use crate::ws::ConnectionSender;

/// Ping interval: server sends WebSocket ping every 30 seconds so abrupt
/// disconnects cannot leak registry entries.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code for unrecoverable server-side errors mid-session.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Whether the reader loop keeps going after a frame is handled.
enum LoopControl {
    Continue,
    Close(u16, String),
}

/// Drive one accepted connection from registration to teardown.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from an mpsc channel
/// - Reader loop: processes inbound frames strictly in arrival order
///
/// The mpsc sender is what the registry stores, so broadcasts from any task
/// reach this client without touching the socket directly. Every exit path
/// funnels through the teardown at the bottom: deregister once, then a leave
/// broadcast gated on the entry actually having been removed.
pub async fn run_connection(socket: WebSocket, state: AppState, user: User, group_id: i64) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let connection_id = state.connections.register(user.clone(), group_id, tx.clone());

    tracing::info!(
        connection_id,
        user_id = user.id,
        username = %user.username,
        group_id,
        "Chat session started"
    );

    // Everyone currently in the group sees the join, the joining tab included.
    broadcast_to_group(
        &state.connections,
        group_id,
        &ServerEnvelope::SystemMessage {
            content: format!("{} joined the chat", user.username),
        },
        None,
    );

    // Spawn writer task: forwards mpsc messages to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: inbound frames from this connection are never reordered
    // or handled concurrently.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    match handle_text_frame(text.as_str(), &tx, &state, &user, group_id).await {
                        LoopControl::Continue => {}
                        LoopControl::Close(code, reason) => {
                            send_to_connection(
                                &tx,
                                &ServerEnvelope::ConnectionError {
                                    error: reason.clone(),
                                },
                            );
                            let _ = tx.send(Message::Close(Some(CloseFrame {
                                code,
                                reason: reason.into(),
                            })));
                            break;
                        }
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!(connection_id, "Ignoring binary frame on text protocol");
                    send_to_connection(
                        &tx,
                        &ServerEnvelope::MessageError {
                            error: "malformed payload".to_string(),
                        },
                    );
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Close(frame) => {
                    tracing::info!(connection_id, reason = ?frame, "Client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(connection_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Teardown: abort writer and ping tasks, then release the registry entry.
    writer_handle.abort();
    ping_handle.abort();

    // Deregistration may race with other failure paths; the Some return
    // means this call won, so the leave broadcast fires exactly once.
    if state.connections.deregister(connection_id).is_some() {
        broadcast_to_group(
            &state.connections,
            group_id,
            &ServerEnvelope::SystemMessage {
                content: format!("{} left the chat", user.username),
            },
            None,
        );
    }

    tracing::info!(
        connection_id,
        user_id = user.id,
        username = %user.username,
        "Chat session ended"
    );
}

/// Handle one inbound text frame. Validation failures are answered inline
/// with a message_error and keep the session open; only internal errors
/// close the connection.
async fn handle_text_frame(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    user: &User,
    group_id: i64,
) -> LoopControl {
    let envelope = match protocol::decode_client(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(user_id = user.id, error = %e, "Rejected inbound frame");
            send_to_connection(
                tx,
                &ServerEnvelope::MessageError {
                    error: e.to_string(),
                },
            );
            return LoopControl::Continue;
        }
    };

    match envelope {
        ClientEnvelope::Init => {
            send_to_connection(
                tx,
                &ServerEnvelope::InitConfirm {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                },
            );
            LoopControl::Continue
        }
        ClientEnvelope::ChatMessage { content } => {
            handle_chat_message(content, tx, state, user, group_id).await
        }
    }
}

/// Validate, persist, and fan out one chat submission.
async fn handle_chat_message(
    content: String,
    tx: &ConnectionSender,
    state: &AppState,
    user: &User,
    group_id: i64,
) -> LoopControl {
    let content = content.trim().to_string();

    if content.is_empty() {
        send_to_connection(
            tx,
            &ServerEnvelope::MessageError {
                error: "message content is empty".to_string(),
            },
        );
        return LoopControl::Continue;
    }
    // Character count, not bytes — exactly MAX_CONTENT_LENGTH is accepted.
    if content.chars().count() > MAX_CONTENT_LENGTH {
        send_to_connection(
            tx,
            &ServerEnvelope::MessageError {
                error: format!("message exceeds {} characters", MAX_CONTENT_LENGTH),
            },
        );
        return LoopControl::Continue;
    }

    let db = state.db.clone();
    let sender_id = user.id;
    let persist_content = content.clone();
    let record = match tokio::task::spawn_blocking(move || {
        store::messages::persist_message(&db, &persist_content, sender_id, group_id, "text")
    })
    .await
    {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => {
            tracing::error!(
                user_id = user.id,
                group_id,
                error = %e,
                "Failed to persist chat message"
            );
            return LoopControl::Close(CLOSE_INTERNAL_ERROR, "internal error".to_string());
        }
        Err(e) => {
            tracing::error!(user_id = user.id, error = %e, "Persistence task failed");
            return LoopControl::Close(CLOSE_INTERNAL_ERROR, "internal error".to_string());
        }
    };

    // Broadcast immediately after the commit so per-recipient delivery order
    // follows commit order. The sender is included: all of a user's own tabs
    // stay in sync.
    broadcast_to_group(
        &state.connections,
        group_id,
        &ServerEnvelope::ChatMessage {
            message: MessagePayload {
                id: record.id,
                content,
                created_at: record.created_at,
                sender_id: user.id,
                group_id,
                message_type: "text".to_string(),
                sender: SenderInfo {
                    id: user.id,
                    username: user.username.clone(),
                    avatar_url: user.avatar_url.clone(),
                },
            },
        },
        None,
    );

    LoopControl::Continue
}

/// Writer task: receives frames from the mpsc channel and forwards them to
/// the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
