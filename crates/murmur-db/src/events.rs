use anyhow::Result;
use rusqlite::Connection;

use murmur_types::events::EventKind;

use crate::Database;
use crate::models::EventRow;
use crate::queries::parse_column;

/// Upper bound on rows returned by one poll. Callers resume from the last
/// id they received, so a capped page never loses events.
pub const MAX_EVENTS_PER_POLL: u32 = 500;

impl Database {
    /// Events for `user_id` with id greater than `since_id`, ascending.
    pub fn events_since(&self, user_id: i64, since_id: i64) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, conversation_id, message_id, created_at
                 FROM events
                 WHERE user_id = ?1 AND id > ?2
                 ORDER BY id ASC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map((user_id, since_id, MAX_EVENTS_PER_POLL), |row| {
                    Ok(EventRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: parse_column(row, 2)?,
                        conversation_id: row.get(3)?,
                        message_id: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Append one event row. Only called from inside a write transaction so the
/// event commits together with the row it describes.
pub(crate) fn insert_event(
    conn: &Connection,
    user_id: i64,
    kind: EventKind,
    conversation_id: Option<i64>,
    message_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (user_id, kind, conversation_id, message_id) VALUES (?1, ?2, ?3, ?4)",
        (user_id, kind.as_str(), conversation_id, message_id),
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn events_are_per_recipient_and_ordered() {
        let t = test_support::open();
        let a = t.user("a@test", "A");
        let b = t.user("b@test", "B");

        let ids: Vec<i64> = t
            .db
            .with_tx(|tx| {
                Ok(vec![
                    insert_event(tx, a, EventKind::GroupAdded, Some(1), None)?,
                    insert_event(tx, b, EventKind::GroupAdded, Some(1), None)?,
                    insert_event(tx, a, EventKind::Message, Some(1), Some(9))?,
                ])
            })
            .unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let for_a = t.db.events_since(a, 0).unwrap();
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].kind, EventKind::GroupAdded);
        assert_eq!(for_a[1].message_id, Some(9));

        let after_first = t.db.events_since(a, for_a[0].id).unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].id, ids[2]);

        assert_eq!(t.db.events_since(b, 0).unwrap().len(), 1);
    }

    #[test]
    fn poll_pages_are_capped() {
        let t = test_support::open();
        let a = t.user("a@test", "A");
        t.db
            .with_tx(|tx| {
                for _ in 0..(MAX_EVENTS_PER_POLL + 5) {
                    insert_event(tx, a, EventKind::GroupRemoved, Some(1), None)?;
                }
                Ok(())
            })
            .unwrap();
        let page = t.db.events_since(a, 0).unwrap();
        assert_eq!(page.len(), MAX_EVENTS_PER_POLL as usize);
        let rest = t.db.events_since(a, page.last().unwrap().id).unwrap();
        assert_eq!(rest.len(), 5);
    }
}
