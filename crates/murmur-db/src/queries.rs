use std::str::FromStr;

use anyhow::Result;
use rusqlite::{Connection, ErrorCode, OptionalExtension, types::Type};

use crate::Database;
use crate::models::UserRow;

impl Database {
    // -- Users --

    /// Insert a user. Returns `None` when the email is already registered.
    pub fn create_user(&self, email: &str, name: &str, pass_hash: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let res = conn.execute(
                "INSERT INTO users (email, name, pass_hash) VALUES (?1, ?2, ?3)",
                (email, name, pass_hash),
            );
            match res {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(e) if is_constraint_violation(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Look up a user by email, creating it if missing. Used for synthetic senders.
    pub fn get_or_create_user(&self, email: &str, name: &str, pass_hash: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (email, name, pass_hash) VALUES (?1, ?2, ?3)",
                (email, name, pass_hash),
            )?;
            let id = conn.query_row("SELECT id FROM users WHERE email = ?1", [email], |row| {
                row.get(0)
            })?;
            Ok(id)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, name, pass_hash, created_at FROM users ORDER BY name, id",
            )?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete every user whose email matches one of the LIKE patterns.
    /// Sessions, memberships, messages and events cascade; conversations
    /// left without an active member go with them.
    pub fn delete_users_like(&self, patterns: &[String]) -> Result<usize> {
        self.with_tx(|tx| {
            let mut deleted = 0;
            for pattern in patterns {
                deleted += tx.execute("DELETE FROM users WHERE email LIKE ?1", [pattern])?;
            }
            if deleted > 0 {
                tx.execute(
                    "DELETE FROM conversations WHERE id NOT IN
                     (SELECT conversation_id FROM conversation_members WHERE active = 1)",
                    [],
                )?;
            }
            Ok(deleted)
        })
    }

    pub fn count_users_like(&self, patterns: &[String]) -> Result<usize> {
        self.with_conn(|conn| {
            let mut total = 0;
            for pattern in patterns {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE email LIKE ?1",
                    [pattern],
                    |row| row.get(0),
                )?;
                total += n as usize;
            }
            Ok(total)
        })
    }

    // -- Sessions --

    /// `expires_at` uses SQLite's "YYYY-MM-DD HH:MM:SS" UTC format so it
    /// compares correctly against `datetime('now')`.
    pub fn insert_session(&self, token: &str, user_id: i64, expires_at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                (token, user_id, expires_at),
            )?;
            Ok(())
        })
    }

    /// Owner of a live (unexpired) session.
    pub fn session_user(&self, token: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let user_id = conn
                .query_row(
                    "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
                    [token],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(user_id)
        })
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
            Ok(n > 0)
        })
    }

    pub fn delete_expired_sessions(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE expires_at <= datetime('now')", [])?;
            Ok(n)
        })
    }
}

fn query_user(conn: &Connection, filter: &str, param: &dyn rusqlite::ToSql) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, name, pass_hash, created_at FROM users WHERE {}",
        filter
    );
    let row = conn.query_row(&sql, [param], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        pass_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Read a TEXT column into one of the string-tagged enums.
pub(crate) fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}
