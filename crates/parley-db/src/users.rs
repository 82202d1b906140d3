use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::UserRow;
use crate::{ChatError, ChatResult, Database};

const USER_COLUMNS: &str = "id, subject, name, email, image_url, created_at";

impl Database {
    /// Create the user behind `subject` on first login, or refresh its
    /// profile fields. The internal id never changes once assigned.
    pub fn upsert_user(
        &self,
        subject: &str,
        name: &str,
        email: &str,
        image_url: &str,
        now_ms: i64,
    ) -> ChatResult<String> {
        if subject.trim().is_empty() {
            return Err(ChatError::invalid("subject must not be empty"));
        }

        self.with_tx(|tx| {
            if let Some(existing) = query_user_by_subject(tx, subject)? {
                tx.execute(
                    "UPDATE users SET name = ?1, email = ?2, image_url = ?3 WHERE id = ?4",
                    (name, email, image_url, &existing.id),
                )?;
                return Ok(existing.id);
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO users (id, subject, name, email, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, subject, name, email, image_url, now_ms],
            )?;
            info!("Registered user {} ({})", name, id);
            Ok(id)
        })
    }

    pub fn resolve_user(&self, subject: Option<&str>) -> ChatResult<Option<UserRow>> {
        self.with_conn(|conn| resolve_caller(conn, subject))
    }

    /// The caller's own record, or `None` when unauthenticated or not yet
    /// registered.
    pub fn get_me(&self, caller: Option<&str>) -> ChatResult<Option<UserRow>> {
        self.resolve_user(caller)
    }

    pub fn get_user(&self, id: &str) -> ChatResult<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Everyone except the caller whose name contains `query`, ignoring case.
    pub fn search_users(&self, caller: Option<&str>, query: &str) -> ChatResult<Vec<UserRow>> {
        self.with_conn(|conn| {
            let Some(me) = resolve_caller(conn, caller)? else {
                return Ok(vec![]);
            };

            let needle = query.trim().to_lowercase();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users WHERE id != ?1 ORDER BY name COLLATE NOCASE, id",
                USER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([&me.id], map_user)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .filter(|u| needle.is_empty() || u.name.to_lowercase().contains(&needle))
                .collect())
        })
    }
}

/// Map an optional auth subject to the internal user.
pub(crate) fn resolve_caller(conn: &Connection, caller: Option<&str>) -> ChatResult<Option<UserRow>> {
    match caller {
        Some(subject) => query_user_by_subject(conn, subject),
        None => Ok(None),
    }
}

/// Like [`resolve_caller`], for mutations that must reject anonymous actors.
pub(crate) fn require_caller(conn: &Connection, caller: Option<&str>) -> ChatResult<UserRow> {
    resolve_caller(conn, caller)?.ok_or(ChatError::NotAuthenticated)
}

pub(crate) fn query_user_by_id(conn: &Connection, id: &str) -> ChatResult<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            [id],
            map_user,
        )
        .optional()?;
    Ok(row)
}

fn query_user_by_subject(conn: &Connection, subject: &str) -> ChatResult<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE subject = ?1", USER_COLUMNS),
            [subject],
            map_user,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        subject: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        image_url: row.get(4)?,
        created_at: row.get(5)?,
    })
}
