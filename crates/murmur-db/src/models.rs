//! Database row types; these map directly to SQLite rows.
//! Conversions into murmur-types API models live here so handlers never
//! touch raw column strings.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use murmur_types::events::{Event, EventKind};
use murmur_types::models::{ChatMessage, ConversationKind, ConversationSummary, User};

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub pass_hash: String,
    pub created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
        }
    }
}

pub struct ConversationRow {
    pub id: i64,
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub peer_name: Option<String>,
    pub message_count: i64,
}

impl From<ConversationRow> for ConversationSummary {
    fn from(row: ConversationRow) -> Self {
        ConversationSummary {
            id: row.id,
            kind: row.kind,
            title: row.title,
            peer_name: row.peer_name,
            message_count: row.message_count,
        }
    }
}

pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub content: String,
    pub created_at: String,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        let created_at = parse_timestamp(&row.created_at, "message", row.id);
        ChatMessage {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            content: row.content,
            created_at,
        }
    }
}

pub struct EventRow {
    pub id: i64,
    pub user_id: i64,
    pub kind: EventKind,
    pub conversation_id: Option<i64>,
    pub message_id: Option<i64>,
    pub created_at: String,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        let created_at = parse_timestamp(&row.created_at, "event", row.id);
        Event {
            id: row.id,
            kind: row.kind,
            conversation_id: row.conversation_id,
            message_id: row.message_id,
            created_at,
        }
    }
}

/// SQLite stores `datetime('now')` as "YYYY-MM-DD HH:MM:SS" without a zone;
/// treat it as UTC.
fn parse_timestamp(raw: &str, what: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {} {}: {}", raw, what, id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn sqlite_timestamps_parse_as_utc() {
        let ts = parse_timestamp("2024-03-05 17:04:09", "message", 1);
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 3, 5));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (17, 4, 9));
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_epoch() {
        assert_eq!(parse_timestamp("yesterday", "event", 2), DateTime::<Utc>::default());
    }
}
