use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
///
/// Events announce that a logical query went stale; clients re-read the
/// affected query over REST. Payloads carry just enough to pick the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// A message was posted
    MessageCreate {
        conversation_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A message was soft-deleted
    MessageDelete {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    /// A reaction was toggled on a message
    ReactionUpdate {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
        added: bool,
    },

    /// A member started or stopped typing
    TypingUpdate {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// Something in the recipient's conversation list changed: a new
    /// conversation, a new last message, or their unread count.
    ConversationUpdate { conversation_id: Uuid },

    /// A user sent a presence heartbeat
    PresenceUpdate { user_id: Uuid },
}

impl GatewayEvent {
    /// Returns the conversation_id if this event is scoped to a conversation's
    /// subscribers. `ConversationUpdate` is delivered per user instead, and
    /// the rest are global.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { conversation_id, .. } => Some(*conversation_id),
            Self::MessageDelete { conversation_id, .. } => Some(*conversation_id),
            Self::ReactionUpdate { conversation_id, .. } => Some(*conversation_id),
            Self::TypingUpdate { conversation_id, .. } => Some(*conversation_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to events for specific conversations.
    /// Conversations the user is not a member of are dropped.
    Subscribe { conversation_ids: Vec<Uuid> },

    /// Presence keep-alive
    Heartbeat,

    /// Start or stop typing in a conversation
    SetTyping { conversation_id: Uuid, is_typing: bool },
}
