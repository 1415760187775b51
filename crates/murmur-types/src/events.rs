use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversationId, EventId, MessageId};

/// What happened to the recipient of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new message was posted in one of the recipient's conversations.
    Message,
    /// The recipient was added to a conversation.
    GroupAdded,
    /// A member left one of the recipient's conversations.
    GroupRemoved,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::GroupAdded => "group_added",
            Self::GroupRemoved => "group_removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "group_added" => Ok(Self::GroupAdded),
            "group_removed" => Ok(Self::GroupRemoved),
            other => Err(format!("unknown event kind '{}'", other)),
        }
    }
}

/// A single entry of a user's event log, as returned by `wait_events`.
///
/// Ids are globally increasing, so the largest id a client has seen is a
/// complete resume cursor for that user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub conversation_id: Option<ConversationId>,
    pub message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}
