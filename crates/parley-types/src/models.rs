use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user. The external auth subject never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image_url: String,
}

/// One emoji badge under a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub liked_by_me: bool,
}

/// A message as a reader sees it: sender resolved, reactions aggregated for
/// the viewer. Deleted messages carry a placeholder instead of their content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender: Option<UserProfile>,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub reactions: Vec<ReactionSummary>,
}

/// Last-message preview shown in the conversation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePreview {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub other_members: Vec<UserProfile>,
    pub last_message: Option<MessagePreview>,
    pub unread_count: usize,
    pub member_count: usize,
}

impl ConversationSummary {
    /// Recency key used to order the conversation list: the last message's
    /// time, or the conversation's own creation time when it has none.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.created_at)
    }
}

/// Header data for a single open conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: Uuid,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub other_members: Vec<UserProfile>,
    pub member_count: usize,
}
