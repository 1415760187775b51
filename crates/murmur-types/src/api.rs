use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::Event;
use crate::models::{ChatMessage, ConversationSummary, User};
use crate::{ConversationId, MessageId, UserId};

// -- Envelope --

/// A remote call: method name plus positional arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Broad failure category, so clients can branch without matching codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    NotFound,
    Forbidden,
    Conflict,
    InvalidInput,
    Internal,
}

/// Body of every failed call: `{"ok": false, "error": CODE, "kind": ..., "message": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: code.to_string(),
            kind,
            message: message.into(),
        }
    }
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGroupResponse {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PairGroupResponse {
    pub conversation_id: ConversationId,
    pub created: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    /// The caller left; other members remain.
    Left,
    /// The caller was the last active member and the conversation is gone.
    ConversationRemoved,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveResponse {
    pub status: LeaveStatus,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: MessageId,
    /// True when the message triggered an automated reply.
    pub responder: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
}

// -- Events --

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_empty() {
        let req: RpcRequest = serde_json::from_str(r#"{"method":"list_users"}"#).unwrap();
        assert_eq!(req.method, "list_users");
        assert!(req.params.is_empty());
    }

    #[test]
    fn unknown_envelope_fields_rejected() {
        let res = serde_json::from_str::<RpcRequest>(r#"{"method":"x","params":[],"id":1}"#);
        assert!(res.is_err());
    }

    #[test]
    fn error_body_shape() {
        let body = ErrorBody::new("NOT_A_MEMBER", ErrorKind::Forbidden, "nope");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "NOT_A_MEMBER");
        assert_eq!(value["kind"], "forbidden");
    }
}
