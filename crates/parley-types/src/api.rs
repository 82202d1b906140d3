use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// Claims carried by bearer tokens from the identity provider. Shared by the
/// REST middleware and the gateway Identify handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// External auth subject, mapped to an internal user on each request.
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    pub exp: usize,
}

// -- Users --

/// Profile sync on login. Fields missing from the body fall back to the
/// token claims.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpsertUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertUserResponse {
    pub user_id: Uuid,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDirectRequest {
    pub other_user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub member_ids: Vec<Uuid>,
    pub group_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationCreated {
    pub conversation_id: Uuid,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageCreated {
    pub message_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub added: bool,
}

// -- Typing --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetTypingRequest {
    pub is_typing: bool,
}
