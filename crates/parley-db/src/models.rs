//! Database row types. These map directly to SQLite rows.
//! Distinct from parley-types view models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use parley_types::models::UserProfile;

pub struct UserRow {
    pub id: String,
    pub subject: String,
    pub name: String,
    pub email: String,
    pub image_url: String,
    pub created_at: i64,
}

pub struct ConversationRow {
    pub id: String,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub created_at: i64,
}

pub struct MemberRow {
    pub conversation_id: String,
    pub user_id: String,
    pub last_seen_message_id: Option<String>,
}

#[derive(Clone)]
pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: i64,
}

pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}

impl UserRow {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: parse_id(&self.id, "user"),
            name: self.name.clone(),
            email: self.email.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// Parse a stored id. Rows only ever hold ids we generated, so a failure
/// means corruption: log it and fall back to the nil id.
pub fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(|| {
        warn!("Out of range timestamp {}", millis);
        DateTime::default()
    })
}
