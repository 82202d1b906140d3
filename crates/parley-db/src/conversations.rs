use rusqlite::{Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::messages::query_messages;
use crate::models::{ConversationRow, MemberRow, MessageRow};
use crate::users::{query_user_by_id, require_caller};
use crate::{ChatError, ChatResult, Database};

/// Groups need the creator plus at least this many others.
pub const MIN_GROUP_OTHERS: usize = 2;

/// Outcome of [`Database::get_or_create_direct`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectConversation {
    pub id: String,
    pub created: bool,
}

impl Database {
    /// Return the direct conversation between the caller and `other_id`,
    /// creating it with both memberships when none exists yet.
    pub fn get_or_create_direct(
        &self,
        caller: Option<&str>,
        other_id: &str,
        now_ms: i64,
    ) -> ChatResult<DirectConversation> {
        self.with_tx(|tx| {
            let me = require_caller(tx, caller)?;
            if me.id == other_id {
                return Err(ChatError::invalid("cannot open a direct conversation with yourself"));
            }
            if query_user_by_id(tx, other_id)?.is_none() {
                return Err(ChatError::not_found("user", other_id));
            }

            if let Some(id) = find_direct(tx, &me.id, other_id)? {
                return Ok(DirectConversation { id, created: false });
            }

            let id = Uuid::new_v4().to_string();
            let key = direct_key(&me.id, other_id);
            let inserted = tx.execute(
                "INSERT INTO conversations (id, is_group, group_name, direct_key, created_at)
                 VALUES (?1, 0, NULL, ?2, ?3)
                 ON CONFLICT(direct_key) DO NOTHING",
                (&id, &key, now_ms),
            )?;

            if inserted == 0 {
                // Another writer created the pair first; hand back theirs.
                let existing: String = tx.query_row(
                    "SELECT id FROM conversations WHERE direct_key = ?1",
                    [&key],
                    |row| row.get(0),
                )?;
                return Ok(DirectConversation { id: existing, created: false });
            }

            insert_member(tx, &id, &me.id)?;
            insert_member(tx, &id, other_id)?;

            info!("Created direct conversation {} between {} and {}", id, me.id, other_id);
            Ok(DirectConversation { id, created: true })
        })
    }

    /// Create a named group of the caller plus `other_ids`. Duplicate ids and
    /// the caller's own id are ignored when counting members.
    pub fn create_group(
        &self,
        caller: Option<&str>,
        other_ids: &[String],
        name: &str,
        now_ms: i64,
    ) -> ChatResult<String> {
        let name = name.trim();

        self.with_tx(|tx| {
            let me = require_caller(tx, caller)?;

            if name.is_empty() {
                return Err(ChatError::invalid("group name must not be empty"));
            }

            let mut others: Vec<&str> = Vec::with_capacity(other_ids.len());
            for id in other_ids {
                if id != &me.id && !others.contains(&id.as_str()) {
                    others.push(id);
                }
            }
            if others.len() < MIN_GROUP_OTHERS {
                return Err(ChatError::invalid(format!(
                    "need at least {} other members",
                    MIN_GROUP_OTHERS
                )));
            }

            for id in &others {
                if query_user_by_id(tx, id)?.is_none() {
                    return Err(ChatError::not_found("user", *id));
                }
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO conversations (id, is_group, group_name, direct_key, created_at)
                 VALUES (?1, 1, ?2, NULL, ?3)",
                (&id, name, now_ms),
            )?;

            insert_member(tx, &id, &me.id)?;
            for other in &others {
                insert_member(tx, &id, other)?;
            }

            info!("Created group '{}' ({}) with {} members", name, id, others.len() + 1);
            Ok(id)
        })
    }

    /// Advance the caller's last-seen pointer to the newest message.
    /// Returns the message now marked, or `None` if the conversation is empty.
    pub fn mark_seen(&self, caller: Option<&str>, conversation_id: &str) -> ChatResult<Option<String>> {
        self.with_tx(|tx| {
            let me = require_caller(tx, caller)?;
            require_member(tx, conversation_id, &me.id)?;

            let latest: Option<String> = tx
                .query_row(
                    "SELECT id FROM messages WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT 1",
                    [conversation_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(message_id) = &latest {
                set_last_seen(tx, conversation_id, &me.id, message_id)?;
            }
            Ok(latest)
        })
    }

    /// Unread messages for `member_id`; zero for non-members.
    pub fn compute_unread(&self, conversation_id: &str, member_id: &str) -> ChatResult<usize> {
        self.with_conn(|conn| {
            let Some(membership) = query_membership(conn, conversation_id, member_id)? else {
                return Ok(0);
            };
            let messages = query_messages(conn, conversation_id)?;
            Ok(unread_count(
                &messages,
                member_id,
                membership.last_seen_message_id.as_deref(),
            ))
        })
    }

    pub fn is_member(&self, conversation_id: &str, user_id: &str) -> ChatResult<bool> {
        self.with_conn(|conn| Ok(query_membership(conn, conversation_id, user_id)?.is_some()))
    }

    pub fn member_ids(&self, conversation_id: &str) -> ChatResult<Vec<String>> {
        self.with_conn(|conn| query_member_ids(conn, conversation_id))
    }
}

/// Count messages after the member's high-water mark, skipping their own.
/// A pointer that does not resolve among `messages` counts as no pointer.
pub fn unread_count(messages: &[MessageRow], member_id: &str, last_seen: Option<&str>) -> usize {
    let start = last_seen
        .and_then(|seen| messages.iter().position(|m| m.id == seen))
        .map_or(0, |idx| idx + 1);

    messages[start..]
        .iter()
        .filter(|m| m.sender_id != member_id)
        .count()
}

/// Unordered pair key: the same for (a, b) and (b, a).
fn direct_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

fn find_direct(conn: &Connection, me: &str, other: &str) -> ChatResult<Option<String>> {
    let id = conn
        .query_row(
            "SELECT c.id FROM conversations c
             JOIN conversation_members a ON a.conversation_id = c.id AND a.user_id = ?1
             JOIN conversation_members b ON b.conversation_id = c.id AND b.user_id = ?2
             WHERE c.is_group = 0
             ORDER BY c.created_at, c.id
             LIMIT 1",
            (me, other),
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn insert_member(conn: &Connection, conversation_id: &str, user_id: &str) -> ChatResult<()> {
    conn.execute(
        "INSERT INTO conversation_members (conversation_id, user_id) VALUES (?1, ?2)",
        (conversation_id, user_id),
    )?;
    Ok(())
}

pub(crate) fn set_last_seen(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
    message_id: &str,
) -> ChatResult<()> {
    conn.execute(
        "UPDATE conversation_members SET last_seen_message_id = ?1
         WHERE conversation_id = ?2 AND user_id = ?3",
        (message_id, conversation_id, user_id),
    )?;
    Ok(())
}

pub(crate) fn query_conversation(conn: &Connection, id: &str) -> ChatResult<Option<ConversationRow>> {
    let row = conn
        .query_row(
            "SELECT id, is_group, group_name, created_at FROM conversations WHERE id = ?1",
            [id],
            |row| {
                Ok(ConversationRow {
                    id: row.get(0)?,
                    is_group: row.get(1)?,
                    group_name: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn query_membership(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> ChatResult<Option<MemberRow>> {
    let row = conn
        .query_row(
            "SELECT conversation_id, user_id, last_seen_message_id FROM conversation_members
             WHERE conversation_id = ?1 AND user_id = ?2",
            (conversation_id, user_id),
            |row| {
                Ok(MemberRow {
                    conversation_id: row.get(0)?,
                    user_id: row.get(1)?,
                    last_seen_message_id: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Membership of an existing conversation: NotFound if the conversation is
/// missing, NotAMember if the user is not in it.
pub(crate) fn require_member(
    conn: &Connection,
    conversation_id: &str,
    user_id: &str,
) -> ChatResult<MemberRow> {
    if query_conversation(conn, conversation_id)?.is_none() {
        return Err(ChatError::not_found("conversation", conversation_id));
    }
    query_membership(conn, conversation_id, user_id)?.ok_or(ChatError::NotAMember)
}

pub(crate) fn query_member_ids(conn: &Connection, conversation_id: &str) -> ChatResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_members WHERE conversation_id = ?1 ORDER BY rowid",
    )?;
    let ids = stmt
        .query_map([conversation_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db, subject, user};

    fn msg(id: &str, sender: &str) -> MessageRow {
        MessageRow {
            seq: 0,
            id: id.into(),
            conversation_id: "c".into(),
            sender_id: sender.into(),
            content: String::new(),
            is_deleted: false,
            created_at: 0,
        }
    }

    #[test]
    fn test_direct_is_shared_by_both_directions() {
        let db = db();
        let ana = user(&db, "Ana");
        let ben = user(&db, "Ben");

        let first = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 10).unwrap();
        assert!(first.created);
        let second = db.get_or_create_direct(Some(&subject("Ben")), &ana.id, 20).unwrap();
        assert!(!second.created);
        assert_eq!(first.id, second.id);

        let again = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 30).unwrap();
        assert_eq!(again.id, first.id);

        assert_eq!(db.member_ids(&first.id).unwrap(), vec![ana.id, ben.id]);
    }

    #[test]
    fn test_direct_insert_conflict_returns_existing_row() {
        let db = db();
        let ana = user(&db, "Ana");
        let ben = user(&db, "Ben");

        // A row holding the pair's key that the membership lookup cannot see,
        // as left by a concurrent writer.
        db.with_conn(|c| {
            c.execute(
                "INSERT INTO conversations (id, is_group, group_name, direct_key, created_at)
                 VALUES ('winner', 0, NULL, ?1, 5)",
                [direct_key(&ben.id, &ana.id)],
            )?;
            Ok(())
        })
        .unwrap();

        let got = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 10).unwrap();
        assert_eq!(got, DirectConversation { id: "winner".into(), created: false });

        let count: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_direct_rejects_bad_targets() {
        let db = db();
        let ana = user(&db, "Ana");

        assert!(matches!(
            db.get_or_create_direct(Some(&subject("Ana")), &ana.id, 0),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            db.get_or_create_direct(Some(&subject("Ana")), "missing", 0),
            Err(ChatError::NotFound { entity: "user", .. })
        ));
        assert!(matches!(
            db.get_or_create_direct(None, &ana.id, 0),
            Err(ChatError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_direct_ignores_shared_groups() {
        let db = db();
        let ben = user(&db, "Ben");
        let cal = user(&db, "Cal");
        user(&db, "Ana");

        let group = db
            .create_group(Some(&subject("Ana")), &[ben.id.clone(), cal.id.clone()], "Team", 0)
            .unwrap();
        let direct = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 1).unwrap();
        assert!(direct.created);
        assert_ne!(direct.id, group);
    }

    #[test]
    fn test_group_validation() {
        let db = db();
        let ana = user(&db, "Ana");
        let ben = user(&db, "Ben");
        let cal = user(&db, "Cal");
        let me = subject("Ana");

        assert!(matches!(
            db.create_group(Some(&me), &[ben.id.clone()], "Team", 0),
            Err(ChatError::InvalidInput(_))
        ));
        // Duplicates and the creator do not count towards the minimum
        assert!(matches!(
            db.create_group(Some(&me), &[ben.id.clone(), ben.id.clone(), ana.id.clone()], "Team", 0),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            db.create_group(Some(&me), &[ben.id.clone(), cal.id.clone()], "   ", 0),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            db.create_group(Some(&me), &[ben.id.clone(), "ghost".into()], "Team", 0),
            Err(ChatError::NotFound { .. })
        ));

        let id = db
            .create_group(Some(&me), &[ben.id.clone(), cal.id.clone()], " Team ", 0)
            .unwrap();
        assert_eq!(db.member_ids(&id).unwrap(), vec![ana.id, ben.id, cal.id]);
        let conv = db.with_conn(|c| query_conversation(c, &id)).unwrap().unwrap();
        assert!(conv.is_group);
        assert_eq!(conv.group_name.as_deref(), Some("Team"));
    }

    #[test]
    fn test_mark_seen() {
        let db = db();
        let ben = user(&db, "Ben");
        user(&db, "Ana");
        user(&db, "Cal");
        let conv = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 0).unwrap().id;

        // Nothing to mark yet
        assert_eq!(db.mark_seen(Some(&subject("Ben")), &conv).unwrap(), None);
        assert!(matches!(
            db.mark_seen(Some(&subject("Cal")), &conv),
            Err(ChatError::NotAMember)
        ));
        assert!(matches!(
            db.mark_seen(Some(&subject("Ben")), "missing"),
            Err(ChatError::NotFound { .. })
        ));

        let sent = db.send_message(Some(&subject("Ana")), &conv, "hi", 5).unwrap();
        assert_eq!(db.compute_unread(&conv, &ben.id).unwrap(), 1);
        assert_eq!(db.mark_seen(Some(&subject("Ben")), &conv).unwrap(), Some(sent.id));
        assert_eq!(db.compute_unread(&conv, &ben.id).unwrap(), 0);
    }

    #[test]
    fn test_unread_count_rules() {
        let msgs = vec![msg("1", "a"), msg("2", "b"), msg("3", "a"), msg("4", "b")];

        assert_eq!(unread_count(&msgs, "b", None), 2);
        assert_eq!(unread_count(&msgs, "b", Some("1")), 1);
        assert_eq!(unread_count(&msgs, "b", Some("4")), 0);
        // Dangling pointer falls back to "never seen"
        assert_eq!(unread_count(&msgs, "b", Some("gone")), 2);
        assert_eq!(unread_count(&[], "b", Some("1")), 0);
    }

    #[test]
    fn test_direct_key_is_unordered() {
        assert_eq!(direct_key("x", "y"), direct_key("y", "x"));
        assert_ne!(direct_key("x", "y"), direct_key("x", "z"));
    }
}
