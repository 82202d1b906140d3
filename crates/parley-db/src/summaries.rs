//! Conversation list and header views, composed from membership, message and
//! user rows.

use rusqlite::Connection;

use parley_types::models::{ConversationDetail, ConversationSummary, UserProfile};

use crate::conversations::{query_conversation, query_membership, unread_count};
use crate::messages::query_messages;
use crate::models::{ConversationRow, parse_id, to_datetime};
use crate::users::{map_user, resolve_caller};
use crate::{ChatResult, Database};

impl Database {
    /// Every conversation of the caller, most recently active first.
    pub fn list_conversations(&self, caller: Option<&str>) -> ChatResult<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let Some(me) = resolve_caller(conn, caller)? else {
                return Ok(vec![]);
            };

            let mut stmt = conn.prepare(
                "SELECT c.id, c.is_group, c.group_name, c.created_at, m.last_seen_message_id
                 FROM conversation_members m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE m.user_id = ?1",
            )?;
            let memberships = stmt
                .query_map([&me.id], |row| {
                    Ok((
                        ConversationRow {
                            id: row.get(0)?,
                            is_group: row.get(1)?,
                            group_name: row.get(2)?,
                            created_at: row.get(3)?,
                        },
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut summaries = Vec::with_capacity(memberships.len());
            for (conv, last_seen) in memberships {
                let (other_members, member_count) = members_except(conn, &conv.id, &me.id)?;
                let messages = query_messages(conn, &conv.id)?;

                summaries.push(ConversationSummary {
                    id: parse_id(&conv.id, "conversation"),
                    is_group: conv.is_group,
                    group_name: conv.group_name,
                    created_at: to_datetime(conv.created_at),
                    other_members,
                    last_message: messages.last().map(|m| m.preview()),
                    unread_count: unread_count(&messages, &me.id, last_seen.as_deref()),
                    member_count,
                });
            }

            summaries.sort_by(|a, b| {
                b.activity_at()
                    .cmp(&a.activity_at())
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(summaries)
        })
    }

    /// Header data for one conversation. `None` when it does not exist or the
    /// caller is anonymous or not a member.
    pub fn get_conversation(
        &self,
        caller: Option<&str>,
        conversation_id: &str,
    ) -> ChatResult<Option<ConversationDetail>> {
        self.with_conn(|conn| {
            let Some(me) = resolve_caller(conn, caller)? else {
                return Ok(None);
            };
            let Some(conv) = query_conversation(conn, conversation_id)? else {
                return Ok(None);
            };
            if query_membership(conn, conversation_id, &me.id)?.is_none() {
                return Ok(None);
            }

            let (other_members, member_count) = members_except(conn, &conv.id, &me.id)?;
            Ok(Some(ConversationDetail {
                id: parse_id(&conv.id, "conversation"),
                is_group: conv.is_group,
                group_name: conv.group_name,
                created_at: to_datetime(conv.created_at),
                other_members,
                member_count,
            }))
        })
    }
}

/// Profiles of every member but `me`, plus the total member count.
fn members_except(
    conn: &Connection,
    conversation_id: &str,
    me: &str,
) -> ChatResult<(Vec<UserProfile>, usize)> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.subject, u.name, u.email, u.image_url, u.created_at
         FROM conversation_members m
         JOIN users u ON u.id = m.user_id
         WHERE m.conversation_id = ?1
         ORDER BY m.rowid",
    )?;
    let members = stmt
        .query_map([conversation_id], map_user)?
        .collect::<Result<Vec<_>, _>>()?;

    let count = members.len();
    let others = members
        .iter()
        .filter(|u| u.id != me)
        .map(|u| u.profile())
        .collect();
    Ok((others, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::DELETED_PLACEHOLDER;
    use crate::test_support::{db, subject, user};

    #[test]
    fn test_sorted_by_activity_with_creation_fallback() {
        let db = db();
        let ben = user(&db, "Ben");
        let cal = user(&db, "Cal");
        let dee = user(&db, "Dee");
        user(&db, "Ana");
        let me = subject("Ana");

        let with_ben = db.get_or_create_direct(Some(&me), &ben.id, 100).unwrap().id;
        let with_cal = db.get_or_create_direct(Some(&me), &cal.id, 200).unwrap().id;
        let with_dee = db.get_or_create_direct(Some(&me), &dee.id, 300).unwrap().id;

        // Old conversation revived by a message after the newest creation time
        db.send_message(Some(&subject("Ben")), &with_ben, "ping", 400).unwrap();

        let order: Vec<String> = db
            .list_conversations(Some(&me))
            .unwrap()
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(order, vec![with_ben, with_dee, with_cal]);
    }

    #[test]
    fn test_summary_shape() {
        let db = db();
        let ben = user(&db, "Ben");
        let cal = user(&db, "Cal");
        user(&db, "Ana");
        let me = subject("Ana");

        let group = db
            .create_group(Some(&me), &[ben.id.clone(), cal.id.clone()], "Team", 0)
            .unwrap();
        db.send_message(Some(&subject("Ben")), &group, "first", 1).unwrap();
        let last = db.send_message(Some(&subject("Cal")), &group, "second", 2).unwrap();
        db.delete_message(Some(&subject("Cal")), &last.id).unwrap();

        let list = db.list_conversations(Some(&me)).unwrap();
        assert_eq!(list.len(), 1);
        let s = &list[0];
        assert!(s.is_group);
        assert_eq!(s.group_name.as_deref(), Some("Team"));
        assert_eq!(s.member_count, 3);
        let names: Vec<&str> = s.other_members.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Ben", "Cal"]);
        assert_eq!(s.unread_count, 2);

        let preview = s.last_message.as_ref().unwrap();
        assert!(preview.is_deleted);
        assert_eq!(preview.content, DELETED_PLACEHOLDER);
    }

    #[test]
    fn test_empty_conversation_has_no_last_message() {
        let db = db();
        let ben = user(&db, "Ben");
        user(&db, "Ana");
        db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 7).unwrap();

        let list = db.list_conversations(Some(&subject("Ben"))).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].last_message.is_none());
        assert_eq!(list[0].unread_count, 0);
        assert_eq!(list[0].other_members[0].name, "Ana");
        assert_eq!(list[0].activity_at(), to_datetime(7));
    }

    #[test]
    fn test_get_conversation() {
        let db = db();
        let ben = user(&db, "Ben");
        user(&db, "Ana");
        user(&db, "Cal");
        let conv = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 0).unwrap().id;

        let detail = db.get_conversation(Some(&subject("Ana")), &conv).unwrap().unwrap();
        assert!(!detail.is_group);
        assert_eq!(detail.member_count, 2);
        assert_eq!(detail.other_members.len(), 1);
        assert_eq!(detail.other_members[0].id.to_string(), ben.id);

        assert!(db.get_conversation(None, &conv).unwrap().is_none());
        assert!(db.get_conversation(Some(&subject("Ana")), "missing").unwrap().is_none());
        assert!(db.get_conversation(Some(&subject("Cal")), &conv).unwrap().is_none());
        assert!(db.list_conversations(None).unwrap().is_empty());
    }
}
