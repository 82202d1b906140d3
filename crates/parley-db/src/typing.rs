use parley_types::models::UserProfile;

use crate::conversations::{query_membership, require_member};
use crate::users::{map_user, resolve_caller, require_caller};
use crate::{ChatResult, Database};

/// A typing signal stays visible this long without a refresh.
pub const TYPING_WINDOW_MS: i64 = 3_000;

impl Database {
    /// Refresh or clear the caller's typing row. Returns the caller's user id.
    pub fn set_typing(
        &self,
        caller: Option<&str>,
        conversation_id: &str,
        is_typing: bool,
        now_ms: i64,
    ) -> ChatResult<String> {
        self.with_tx(|tx| {
            let me = require_caller(tx, caller)?;
            require_member(tx, conversation_id, &me.id)?;

            if is_typing {
                tx.execute(
                    "INSERT INTO typing (conversation_id, user_id, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(conversation_id, user_id) DO UPDATE SET updated_at = excluded.updated_at",
                    (conversation_id, &me.id, now_ms),
                )?;
            } else {
                tx.execute(
                    "DELETE FROM typing WHERE conversation_id = ?1 AND user_id = ?2",
                    (conversation_id, &me.id),
                )?;
            }
            Ok(me.id)
        })
    }

    /// Members other than the caller with a fresh typing signal.
    pub fn list_typing(
        &self,
        caller: Option<&str>,
        conversation_id: &str,
        now_ms: i64,
    ) -> ChatResult<Vec<UserProfile>> {
        self.with_conn(|conn| {
            let Some(me) = resolve_caller(conn, caller)? else {
                return Ok(vec![]);
            };
            if query_membership(conn, conversation_id, &me.id)?.is_none() {
                return Ok(vec![]);
            }

            let mut stmt = conn.prepare(
                "SELECT u.id, u.subject, u.name, u.email, u.image_url, u.created_at
                 FROM typing t
                 JOIN users u ON u.id = t.user_id
                 WHERE t.conversation_id = ?1 AND t.user_id != ?2 AND ?3 - t.updated_at < ?4
                 ORDER BY t.updated_at, u.id",
            )?;
            let users = stmt
                .query_map(
                    rusqlite::params![conversation_id, me.id, now_ms, TYPING_WINDOW_MS],
                    map_user,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(users.iter().map(|u| u.profile()).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatError;
    use crate::test_support::{db, subject, user};

    #[test]
    fn test_typing_window_and_self_exclusion() {
        let db = db();
        let ben = user(&db, "Ben");
        let ana = user(&db, "Ana");
        let conv = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 0).unwrap().id;

        db.set_typing(Some(&subject("Ana")), &conv, true, 0).unwrap();

        let seen_by_ben = db.list_typing(Some(&subject("Ben")), &conv, TYPING_WINDOW_MS - 1).unwrap();
        assert_eq!(seen_by_ben.len(), 1);
        assert_eq!(seen_by_ben[0].id.to_string(), ana.id);

        assert!(db.list_typing(Some(&subject("Ana")), &conv, 0).unwrap().is_empty());
        assert!(db.list_typing(Some(&subject("Ben")), &conv, TYPING_WINDOW_MS).unwrap().is_empty());
    }

    #[test]
    fn test_stop_typing_clears_immediately() {
        let db = db();
        let ben = user(&db, "Ben");
        user(&db, "Ana");
        let conv = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 0).unwrap().id;

        db.set_typing(Some(&subject("Ana")), &conv, true, 0).unwrap();
        db.set_typing(Some(&subject("Ana")), &conv, false, 10).unwrap();
        assert!(db.list_typing(Some(&subject("Ben")), &conv, 20).unwrap().is_empty());

        // Stopping without a row is fine
        db.set_typing(Some(&subject("Ana")), &conv, false, 30).unwrap();
    }

    #[test]
    fn test_typing_requires_membership() {
        let db = db();
        let ben = user(&db, "Ben");
        user(&db, "Ana");
        user(&db, "Cal");
        let conv = db.get_or_create_direct(Some(&subject("Ana")), &ben.id, 0).unwrap().id;

        assert!(matches!(
            db.set_typing(Some(&subject("Cal")), &conv, true, 0),
            Err(ChatError::NotAMember)
        ));
        assert!(matches!(
            db.set_typing(None, &conv, true, 0),
            Err(ChatError::NotAuthenticated)
        ));
        assert!(db.list_typing(None, &conv, 0).unwrap().is_empty());
    }
}
