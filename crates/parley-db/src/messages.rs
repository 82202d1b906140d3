use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use parley_types::models::{MessagePreview, MessageView};

use crate::conversations::{query_membership, require_member, set_last_seen};
use crate::models::{MessageRow, ReactionRow, UserRow, parse_id, to_datetime};
use crate::reactions::{aggregate, query_reactions_for_conversation};
use crate::users::{resolve_caller, require_caller};
use crate::{ChatError, ChatResult, Database};

/// Shown in place of a deleted message's content, to every reader.
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

pub const MAX_CONTENT_CHARS: usize = 4000;

const MESSAGE_COLUMNS: &str = "seq, id, conversation_id, sender_id, content, is_deleted, created_at";

impl MessageRow {
    /// Content as readers may see it.
    pub fn visible_content(&self) -> &str {
        if self.is_deleted {
            DELETED_PLACEHOLDER
        } else {
            &self.content
        }
    }

    pub fn preview(&self) -> MessagePreview {
        MessagePreview {
            id: parse_id(&self.id, "message"),
            sender_id: parse_id(&self.sender_id, "sender"),
            content: self.visible_content().to_string(),
            is_deleted: self.is_deleted,
            created_at: to_datetime(self.created_at),
        }
    }
}

impl Database {
    /// Post a message and move the sender's own last-seen pointer onto it.
    pub fn send_message(
        &self,
        caller: Option<&str>,
        conversation_id: &str,
        content: &str,
        now_ms: i64,
    ) -> ChatResult<MessageRow> {
        self.with_tx(|tx| {
            let me = require_caller(tx, caller)?;
            require_member(tx, conversation_id, &me.id)?;

            if content.trim().is_empty() {
                return Err(ChatError::invalid("message must not be empty"));
            }
            if content.chars().count() > MAX_CONTENT_CHARS {
                return Err(ChatError::invalid(format!(
                    "message exceeds {} characters",
                    MAX_CONTENT_CHARS
                )));
            }

            // Keep timestamps in step with insertion order even if the clock
            // steps backwards.
            let created_at = match latest_message(tx, conversation_id)? {
                Some(last) => now_ms.max(last.created_at),
                None => now_ms,
            };

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, is_deleted, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                rusqlite::params![id, conversation_id, me.id, content, created_at],
            )?;
            set_last_seen(tx, conversation_id, &me.id, &id)?;

            query_message(tx, &id)?.ok_or_else(|| ChatError::Internal("inserted message vanished".into()))
        })
    }

    /// Soft-delete one of the caller's own messages. Returns the updated row.
    pub fn delete_message(&self, caller: Option<&str>, message_id: &str) -> ChatResult<MessageRow> {
        self.with_tx(|tx| {
            let me = require_caller(tx, caller)?;
            let mut message =
                query_message(tx, message_id)?.ok_or_else(|| ChatError::not_found("message", message_id))?;
            if message.sender_id != me.id {
                return Err(ChatError::NotOwner);
            }

            tx.execute("UPDATE messages SET is_deleted = 1 WHERE id = ?1", [message_id])?;
            message.is_deleted = true;
            Ok(message)
        })
    }

    /// Every message of the conversation, oldest first, with sender and
    /// reactions resolved for the caller. Anonymous callers and non-members
    /// get an empty list.
    pub fn list_messages(&self, caller: Option<&str>, conversation_id: &str) -> ChatResult<Vec<MessageView>> {
        self.with_conn(|conn| {
            let Some(me) = resolve_caller(conn, caller)? else {
                return Ok(vec![]);
            };
            if query_membership(conn, conversation_id, &me.id)?.is_none() {
                return Ok(vec![]);
            }

            let rows = query_messages_with_senders(conn, conversation_id)?;

            let mut reactions: HashMap<String, Vec<ReactionRow>> = HashMap::new();
            for r in query_reactions_for_conversation(conn, conversation_id)? {
                reactions.entry(r.message_id.clone()).or_default().push(r);
            }

            let views = rows
                .into_iter()
                .map(|(row, sender)| {
                    let reactions = reactions
                        .get(&row.id)
                        .map(|rs| aggregate(rs, &me.id))
                        .unwrap_or_default();

                    MessageView {
                        id: parse_id(&row.id, "message"),
                        conversation_id: parse_id(&row.conversation_id, "conversation"),
                        sender_id: parse_id(&row.sender_id, "sender"),
                        sender: sender.map(|u| u.profile()),
                        content: row.visible_content().to_string(),
                        is_deleted: row.is_deleted,
                        created_at: to_datetime(row.created_at),
                        reactions,
                    }
                })
                .collect();

            Ok(views)
        })
    }
}

pub(crate) fn query_messages(conn: &Connection, conversation_id: &str) -> ChatResult<Vec<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY seq",
        MESSAGE_COLUMNS
    ))?;
    let rows = stmt
        .query_map([conversation_id], map_message)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn query_message(conn: &Connection, id: &str) -> ChatResult<Option<MessageRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
            [id],
            map_message,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn latest_message(conn: &Connection, conversation_id: &str) -> ChatResult<Option<MessageRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT 1",
                MESSAGE_COLUMNS
            ),
            [conversation_id],
            map_message,
        )
        .optional()?;
    Ok(row)
}

// JOIN users to fetch the sender in the same query (avoids N+1)
fn query_messages_with_senders(
    conn: &Connection,
    conversation_id: &str,
) -> ChatResult<Vec<(MessageRow, Option<UserRow>)>> {
    let mut stmt = conn.prepare(
        "SELECT m.seq, m.id, m.conversation_id, m.sender_id, m.content, m.is_deleted, m.created_at,
                u.id, u.subject, u.name, u.email, u.image_url, u.created_at
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.conversation_id = ?1
         ORDER BY m.seq",
    )?;

    let rows = stmt
        .query_map([conversation_id], |row| {
            let message = map_message(row)?;
            let sender = match row.get::<_, Option<String>>(7)? {
                Some(id) => Some(UserRow {
                    id,
                    subject: row.get(8)?,
                    name: row.get(9)?,
                    email: row.get(10)?,
                    image_url: row.get(11)?,
                    created_at: row.get(12)?,
                }),
                None => None,
            };
            Ok((message, sender))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        conversation_id: row.get(2)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        is_deleted: row.get(5)?,
        created_at: row.get(6)?,
    })
}
