use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use murmur_types::events::EventKind;
use murmur_types::models::ConversationKind;

use crate::Database;
use crate::events::insert_event;
use crate::models::{ConversationRow, MessageRow};
use crate::queries::parse_column;

/// Whether a user may read or post in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Member,
    NotMember,
    ConversationMissing,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CreateGroupOutcome {
    /// `recipients` got a `group_added` event.
    Created { conversation_id: i64, recipients: Vec<i64> },
    UnknownUsers(Vec<i64>),
}

#[derive(Debug, PartialEq, Eq)]
pub enum PairOutcome {
    Existing(i64),
    /// `recipient` got a `group_added` event.
    Created { conversation_id: i64, recipient: i64 },
    UnknownUser,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PostOutcome {
    /// `recipients` each got a `message` event.
    Posted { message_id: i64, recipients: Vec<i64> },
    NotMember,
    ConversationMissing,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// `remaining` each got a `group_removed` event.
    Left { remaining: Vec<i64> },
    /// The leaver was the last active member; conversation, memberships and
    /// messages are gone.
    Removed,
    NotMember,
    ConversationMissing,
}

/// Canonical key of a direct pairing, independent of who asked.
pub fn pair_key(a: i64, b: i64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", lo, hi)
}

impl Database {
    // -- Conversations --

    /// Create a group with `creator` plus `members` (deduplicated) and fan
    /// out `group_added` to everyone but the creator.
    pub fn create_group(
        &self,
        creator: i64,
        title: Option<&str>,
        members: &[i64],
    ) -> Result<CreateGroupOutcome> {
        self.with_tx(|tx| {
            let mut all: BTreeSet<i64> = members.iter().copied().collect();
            all.insert(creator);

            let missing = missing_users(tx, &all)?;
            if !missing.is_empty() {
                return Ok(CreateGroupOutcome::UnknownUsers(missing));
            }

            tx.execute(
                "INSERT INTO conversations (kind, title) VALUES (?1, ?2)",
                (ConversationKind::Group.as_str(), title),
            )?;
            let conversation_id = tx.last_insert_rowid();

            let mut recipients = Vec::with_capacity(all.len());
            for &user_id in &all {
                add_member(tx, conversation_id, user_id)?;
                if user_id != creator {
                    insert_event(tx, user_id, EventKind::GroupAdded, Some(conversation_id), None)?;
                    recipients.push(user_id);
                }
            }

            Ok(CreateGroupOutcome::Created { conversation_id, recipients })
        })
    }

    /// Return the live direct conversation between `actor` and `other`, or
    /// create it.
    ///
    /// Lookup and insert share one IMMEDIATE transaction, and `pair_key` is
    /// UNIQUE, so concurrent calls from both sides converge on one row.
    pub fn ensure_pair(&self, actor: i64, other: i64) -> Result<PairOutcome> {
        let key = pair_key(actor, other);
        self.with_tx(|tx| {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM conversations WHERE pair_key = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok(PairOutcome::Existing(id));
            }

            if !missing_users(tx, &BTreeSet::from([other]))?.is_empty() {
                return Ok(PairOutcome::UnknownUser);
            }

            tx.execute(
                "INSERT INTO conversations (kind, title, pair_key) VALUES (?1, NULL, ?2)",
                (ConversationKind::Direct.as_str(), &key),
            )?;
            let conversation_id = tx.last_insert_rowid();
            add_member(tx, conversation_id, actor)?;
            add_member(tx, conversation_id, other)?;
            insert_event(tx, other, EventKind::GroupAdded, Some(conversation_id), None)?;

            Ok(PairOutcome::Created { conversation_id, recipient: other })
        })
    }

    /// Every conversation where `user_id` is an active member, newest first.
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind, c.title,
                        (SELECT u.name
                           FROM conversation_members om
                           JOIN users u ON u.id = om.user_id
                          WHERE c.kind = 'direct'
                            AND om.conversation_id = c.id
                            AND om.user_id != ?1
                          ORDER BY om.active DESC
                          LIMIT 1) AS peer_name,
                        (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
                 FROM conversations c
                 JOIN conversation_members cm
                   ON cm.conversation_id = c.id AND cm.user_id = ?1 AND cm.active = 1
                 ORDER BY c.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        kind: parse_column(row, 1)?,
                        title: row.get(2)?,
                        peer_name: row.get(3)?,
                        message_count: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn access(&self, conversation_id: i64, user_id: i64) -> Result<Access> {
        self.with_conn(|conn| check_access(conn, conversation_id, user_id))
    }

    /// Deactivate `user_id`'s membership; delete the conversation if nobody
    /// active is left, otherwise tell the remaining members.
    pub fn leave_conversation(&self, conversation_id: i64, user_id: i64) -> Result<LeaveOutcome> {
        self.with_tx(|tx| {
            let kind: Option<ConversationKind> = tx
                .query_row(
                    "SELECT kind FROM conversations WHERE id = ?1",
                    [conversation_id],
                    |row| parse_column(row, 0),
                )
                .optional()?;
            let Some(kind) = kind else {
                return Ok(LeaveOutcome::ConversationMissing);
            };
            if !is_active_member(tx, conversation_id, user_id)? {
                return Ok(LeaveOutcome::NotMember);
            }

            tx.execute(
                "UPDATE conversation_members SET active = 0
                 WHERE conversation_id = ?1 AND user_id = ?2",
                (conversation_id, user_id),
            )?;

            // a broken pair no longer counts as the pair's direct conversation
            if kind == ConversationKind::Direct {
                tx.execute(
                    "UPDATE conversations SET pair_key = NULL WHERE id = ?1",
                    [conversation_id],
                )?;
            }

            let remaining = active_members(tx, conversation_id)?;
            if remaining.is_empty() {
                tx.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
                return Ok(LeaveOutcome::Removed);
            }

            for &member in &remaining {
                insert_event(tx, member, EventKind::GroupRemoved, Some(conversation_id), None)?;
            }
            Ok(LeaveOutcome::Left { remaining })
        })
    }

    // -- Messages --

    /// Insert a message and fan out one `message` event per other active
    /// member in the same transaction.
    ///
    /// With `require_member` unset the sender may be outside the
    /// conversation (synthetic senders such as the responder bot).
    pub fn post_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
        require_member: bool,
    ) -> Result<PostOutcome> {
        self.with_tx(|tx| {
            match check_access(tx, conversation_id, sender_id)? {
                Access::ConversationMissing => return Ok(PostOutcome::ConversationMissing),
                Access::NotMember if require_member => return Ok(PostOutcome::NotMember),
                _ => {}
            }

            tx.execute(
                "INSERT INTO messages (conversation_id, sender_id, content) VALUES (?1, ?2, ?3)",
                (conversation_id, sender_id, content),
            )?;
            let message_id = tx.last_insert_rowid();

            let recipients: Vec<i64> = active_members(tx, conversation_id)?
                .into_iter()
                .filter(|&uid| uid != sender_id)
                .collect();
            for &uid in &recipients {
                insert_event(tx, uid, EventKind::Message, Some(conversation_id), Some(message_id))?;
            }

            Ok(PostOutcome::Posted { message_id, recipients })
        })
    }

    /// Page of history: the `limit` newest messages after skipping `offset`,
    /// returned oldest first.
    pub fn get_messages(&self, conversation_id: i64, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.conversation_id = ?1 ORDER BY m.id DESC LIMIT ?2 OFFSET ?3",
                MESSAGE_SELECT
            ))?;
            let mut rows = stmt
                .query_map((conversation_id, limit, offset), map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Every message with id greater than `after_id`, ascending.
    pub fn get_messages_since(&self, conversation_id: i64, after_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.conversation_id = ?1 AND m.id > ?2 ORDER BY m.id ASC",
                MESSAGE_SELECT
            ))?;
            let rows = stmt
                .query_map((conversation_id, after_id), map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// JOIN users to resolve the sender name in the same query
const MESSAGE_SELECT: &str = "SELECT m.id, m.conversation_id, m.sender_id, u.name, m.content, m.created_at
     FROM messages m
     LEFT JOIN users u ON u.id = m.sender_id";

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn check_access(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<Access> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
        [conversation_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(Access::ConversationMissing);
    }
    if is_active_member(conn, conversation_id, user_id)? {
        Ok(Access::Member)
    } else {
        Ok(Access::NotMember)
    }
}

fn is_active_member(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<bool> {
    let active: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversation_members
                        WHERE conversation_id = ?1 AND user_id = ?2 AND active = 1)",
        (conversation_id, user_id),
        |row| row.get(0),
    )?;
    Ok(active)
}

fn active_members(conn: &Connection, conversation_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_members
         WHERE conversation_id = ?1 AND active = 1
         ORDER BY user_id",
    )?;
    let ids = stmt
        .query_map([conversation_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn add_member(conn: &Connection, conversation_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO conversation_members (conversation_id, user_id, active) VALUES (?1, ?2, 1)",
        (conversation_id, user_id),
    )?;
    Ok(())
}

fn missing_users(conn: &Connection, ids: &BTreeSet<i64>) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)")?;
    let mut missing = Vec::new();
    for &id in ids {
        let exists: bool = stmt.query_row([id], |row| row.get(0))?;
        if !exists {
            missing.push(id);
        }
    }
    Ok(missing)
}
