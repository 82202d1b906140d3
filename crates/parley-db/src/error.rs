use thiserror::Error;

/// Failure of a store operation.
///
/// Reads never produce the domain variants: missing identity or data yields an
/// empty or `None` result instead.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Not a member of this conversation")]
    NotAMember,

    #[error("Can only delete your own messages")]
    NotOwner,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
