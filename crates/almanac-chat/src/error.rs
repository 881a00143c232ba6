//! Error types for grounded conversations.

use almanac_core::error::AlmanacError;
use almanac_core::types::ConversationId;

/// Errors from the conversation orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("{0}")]
    NotFound(String),
    #[error("conversation {0} has no user message awaiting a reply")]
    NoPendingUserMessage(ConversationId),
    /// The completion gateway failed or timed out. Nothing was appended.
    #[error("reply generation failed: {0}")]
    GenerationFailed(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl ChatError {
    /// Whether the same call may succeed when tried again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::GenerationFailed(_))
    }
}

impl From<AlmanacError> for ChatError {
    fn from(err: AlmanacError) -> Self {
        match err {
            AlmanacError::NotFound { .. } => ChatError::NotFound(err.to_string()),
            other => ChatError::StorageError(other.to_string()),
        }
    }
}
