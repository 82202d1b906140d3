use rusqlite::{Connection, OptionalExtension};

use parley_types::models::ReactionSummary;

use crate::conversations::query_membership;
use crate::messages::query_message;
use crate::models::ReactionRow;
use crate::users::require_caller;
use crate::{ChatError, ChatResult, Database};

pub const ALLOWED_EMOJIS: [&str; 5] = ["👍", "❤️", "😂", "😮", "😢"];

/// Outcome of [`Database::toggle_reaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionToggle {
    /// true if the reaction now exists, false if it was removed
    pub added: bool,
    pub conversation_id: String,
    pub user_id: String,
}

impl Database {
    /// Toggle a reaction: removes if exists, inserts if not.
    pub fn toggle_reaction(
        &self,
        caller: Option<&str>,
        message_id: &str,
        emoji: &str,
    ) -> ChatResult<ReactionToggle> {
        self.with_tx(|tx| {
            let me = require_caller(tx, caller)?;
            if !ALLOWED_EMOJIS.contains(&emoji) {
                return Err(ChatError::invalid(format!("emoji '{}' is not allowed", emoji)));
            }

            let message =
                query_message(tx, message_id)?.ok_or_else(|| ChatError::not_found("message", message_id))?;
            if query_membership(tx, &message.conversation_id, &me.id)?.is_none() {
                return Err(ChatError::NotAMember);
            }

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT seq FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                    (message_id, &me.id, emoji),
                    |row| row.get(0),
                )
                .optional()?;

            let added = match existing {
                Some(seq) => {
                    tx.execute("DELETE FROM reactions WHERE seq = ?1", [seq])?;
                    false
                }
                None => {
                    tx.execute(
                        "INSERT INTO reactions (message_id, user_id, emoji) VALUES (?1, ?2, ?3)",
                        (message_id, &me.id, emoji),
                    )?;
                    true
                }
            };

            Ok(ReactionToggle {
                added,
                conversation_id: message.conversation_id,
                user_id: me.id,
            })
        })
    }
}

/// Group reaction rows by emoji, in the order each emoji first appears.
pub fn aggregate(rows: &[ReactionRow], viewer_id: &str) -> Vec<ReactionSummary> {
    let mut groups: Vec<ReactionSummary> = Vec::new();
    for r in rows {
        let idx = match groups.iter().position(|g| g.emoji == r.emoji) {
            Some(idx) => idx,
            None => {
                groups.push(ReactionSummary {
                    emoji: r.emoji.clone(),
                    count: 0,
                    liked_by_me: false,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        group.count += 1;
        if r.user_id == viewer_id {
            group.liked_by_me = true;
        }
    }
    groups
}

/// All reactions on a conversation's messages, in insertion order.
pub(crate) fn query_reactions_for_conversation(
    conn: &Connection,
    conversation_id: &str,
) -> ChatResult<Vec<ReactionRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.message_id, r.user_id, r.emoji
         FROM reactions r
         JOIN messages m ON m.id = r.message_id
         WHERE m.conversation_id = ?1
         ORDER BY r.seq",
    )?;
    let rows = stmt
        .query_map([conversation_id], |row| {
            Ok(ReactionRow {
                message_id: row.get(0)?,
                user_id: row.get(1)?,
                emoji: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
