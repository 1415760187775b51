pub mod api;
pub mod events;
pub mod models;

/// Integer row id of a user.
pub type UserId = i64;
/// Integer row id of a conversation.
pub type ConversationId = i64;
/// Integer row id of a message; ordered store-wide.
pub type MessageId = i64;
/// Integer row id of an event; the long-poll resume cursor.
pub type EventId = i64;
