use crate::users::require_caller;
use crate::{ChatResult, Database};

/// A user counts as online for this long after their last heartbeat.
pub const ONLINE_WINDOW_MS: i64 = 15_000;

impl Database {
    /// Record that the caller is active now. Returns the caller's user id.
    pub fn heartbeat(&self, caller: Option<&str>, now_ms: i64) -> ChatResult<String> {
        self.with_tx(|tx| {
            let me = require_caller(tx, caller)?;
            tx.execute(
                "INSERT INTO presence (user_id, updated_at) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET updated_at = excluded.updated_at",
                (&me.id, now_ms),
            )?;
            Ok(me.id)
        })
    }

    /// Users whose last heartbeat is inside the liveness window at `now_ms`.
    /// Stale rows are never cleaned up; they simply stop qualifying.
    pub fn list_online(&self, now_ms: i64) -> ChatResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM presence WHERE ?1 - updated_at < ?2 ORDER BY user_id",
            )?;
            let ids = stmt
                .query_map((now_ms, ONLINE_WINDOW_MS), |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatError;
    use crate::test_support::{db, subject, user};

    #[test]
    fn test_liveness_window() {
        let db = db();
        let ana = user(&db, "Ana");

        db.heartbeat(Some(&subject("Ana")), 0).unwrap();
        assert_eq!(db.list_online(0).unwrap(), vec![ana.id.clone()]);
        assert_eq!(db.list_online(ONLINE_WINDOW_MS - 1).unwrap(), vec![ana.id.clone()]);
        assert!(db.list_online(ONLINE_WINDOW_MS).unwrap().is_empty());

        // A later heartbeat revives the same row
        db.heartbeat(Some(&subject("Ana")), 20_000).unwrap();
        assert_eq!(db.list_online(30_000).unwrap(), vec![ana.id]);
    }

    #[test]
    fn test_heartbeat_requires_identity() {
        let db = db();
        assert!(matches!(db.heartbeat(None, 0), Err(ChatError::NotAuthenticated)));
        assert!(matches!(
            db.heartbeat(Some("auth|ghost"), 0),
            Err(ChatError::NotAuthenticated)
        ));
    }
}
