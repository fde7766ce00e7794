//! Wire envelopes exchanged over the chat WebSocket. Everything on the
//! socket is a JSON object tagged by a `type` field, decoded once at the
//! boundary into a closed enum and matched exhaustively by the session actor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum chat message length, in characters.
pub const MAX_CONTENT_LENGTH: usize = 1000;

/// Frames a client may send.
#[derive(Debug, PartialEq)]
pub enum ClientEnvelope {
    /// Keepalive / handshake probe; answered with InitConfirm, never persisted.
    Init,
    ChatMessage { content: String },
}

/// A frame that could not be mapped onto ClientEnvelope. Recoverable: the
/// session answers with a message_error and keeps the connection open.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("unknown message type \"{0}\"")]
    UnknownType(String),
    #[error("malformed payload")]
    Malformed,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<String>,
}

/// Decode one inbound text frame. A missing `type` field is treated as an
/// implicit chat message, which is what the original web client sends.
pub fn decode_client(text: &str) -> Result<ClientEnvelope, ProtocolError> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(|_| ProtocolError::Malformed)?;
    match raw.kind.as_deref() {
        Some("init") => Ok(ClientEnvelope::Init),
        Some("chat_message") | None => Ok(ClientEnvelope::ChatMessage {
            content: raw.content.unwrap_or_default(),
        }),
        Some(other) => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

/// Frames the server sends. Serialized with an external `type` tag so the
/// wire shape is `{"type": "...", ...fields}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// A persisted chat message fanned out to the whole group.
    ChatMessage { message: MessagePayload },
    /// Synthetic join/leave notification; never persisted.
    SystemMessage { content: String },
    /// Connection-level failure surfaced to one client.
    ConnectionError { error: String },
    /// Per-message validation failure; the connection stays open.
    MessageError { error: String },
    /// Reply to an init probe.
    InitConfirm { timestamp: String },
}

/// The `message` object inside a chat_message envelope, mirroring the
/// persisted row plus a sender summary.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub id: i64,
    pub content: String,
    pub created_at: String,
    pub sender_id: i64,
    pub group_id: i64,
    pub message_type: String,
    pub sender: SenderInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SenderInfo {
    pub id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn decodes_init() {
        assert_eq!(decode_client(r#"{"type":"init"}"#), Ok(ClientEnvelope::Init));
    }

    #[test]
    fn decodes_tagged_chat_message() {
        assert_eq!(
            decode_client(r#"{"type":"chat_message","content":"hi"}"#),
            Ok(ClientEnvelope::ChatMessage {
                content: "hi".to_string()
            })
        );
    }

    #[test]
    fn missing_type_is_an_implicit_chat_message() {
        assert_eq!(
            decode_client(r#"{"content":"hi"}"#),
            Ok(ClientEnvelope::ChatMessage {
                content: "hi".to_string()
            })
        );
    }

    #[test]
    fn missing_content_decodes_to_empty() {
        // Caught later by content validation, not by the codec.
        assert_eq!(
            decode_client(r#"{"type":"chat_message"}"#),
            Ok(ClientEnvelope::ChatMessage {
                content: String::new()
            })
        );
    }

    #[test]
    fn unknown_type_is_rejected_but_recoverable() {
        assert_eq!(
            decode_client(r#"{"type":"typing"}"#),
            Err(ProtocolError::UnknownType("typing".to_string()))
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(decode_client("not json"), Err(ProtocolError::Malformed));
        assert_eq!(decode_client(r#"[1,2,3]"#), Err(ProtocolError::Malformed));
    }

    #[test]
    fn system_message_wire_shape() {
        let envelope = ServerEnvelope::SystemMessage {
            content: "alice joined the chat".to_string(),
        };
        let value: Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "system_message");
        assert_eq!(value["content"], "alice joined the chat");
    }

    #[test]
    fn chat_message_wire_shape() {
        let envelope = ServerEnvelope::ChatMessage {
            message: MessagePayload {
                id: 42,
                content: "hi".to_string(),
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
                sender_id: 7,
                group_id: 1,
                message_type: "text".to_string(),
                sender: SenderInfo {
                    id: 7,
                    username: "alice".to_string(),
                    avatar_url: None,
                },
            },
        };
        let value: Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["message"]["id"], 42);
        assert_eq!(value["message"]["sender"]["username"], "alice");
        assert_eq!(value["message"]["group_id"], 1);
    }

    #[test]
    fn error_envelopes_are_distinguished() {
        let conn_err = serde_json::to_value(ServerEnvelope::ConnectionError {
            error: "x".to_string(),
        })
        .unwrap();
        let msg_err = serde_json::to_value(ServerEnvelope::MessageError {
            error: "x".to_string(),
        })
        .unwrap();
        assert_eq!(conn_err["type"], "connection_error");
        assert_eq!(msg_err["type"], "message_error");
    }
}
