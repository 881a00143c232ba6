use serde::{Deserialize, Serialize};

use crate::types::{
    ConversationId, MessageId, MessageRole, SourceId, SourceType, SpaceId, Timestamp,
    TranscriptionStatus,
};

/// Domain events published after state changes.
///
/// Consumed by UI push channels and by tests observing the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Source lifecycle
    // =========================================================================
    SourceCreated {
        source_id: SourceId,
        space_id: SpaceId,
        source_type: SourceType,
        timestamp: Timestamp,
    },

    TranscriptionStatusChanged {
        source_id: SourceId,
        from: TranscriptionStatus,
        to: TranscriptionStatus,
        timestamp: Timestamp,
    },

    /// Content became available; the source is now searchable.
    SourceReady {
        source_id: SourceId,
        space_id: SpaceId,
        word_count: usize,
        timestamp: Timestamp,
    },

    SummaryGenerated {
        source_id: SourceId,
        tokens_used: u32,
        timestamp: Timestamp,
    },

    /// Summarization failed; the source keeps `summary = null`.
    SummaryFailed {
        source_id: SourceId,
        reason: String,
        timestamp: Timestamp,
    },

    SourceDeleted {
        source_id: SourceId,
        space_id: SpaceId,
        timestamp: Timestamp,
    },

    SpaceDeleted {
        space_id: SpaceId,
        sources_removed: usize,
        conversations_removed: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Conversations
    // =========================================================================
    MessageAppended {
        conversation_id: ConversationId,
        message_id: MessageId,
        role: MessageRole,
        sources_used: usize,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceCreated { .. } => "source_created",
            Self::TranscriptionStatusChanged { .. } => "transcription_status_changed",
            Self::SourceReady { .. } => "source_ready",
            Self::SummaryGenerated { .. } => "summary_generated",
            Self::SummaryFailed { .. } => "summary_failed",
            Self::SourceDeleted { .. } => "source_deleted",
            Self::SpaceDeleted { .. } => "space_deleted",
            Self::MessageAppended { .. } => "message_appended",
        }
    }

    /// The source this event concerns, if any.
    pub fn source_id(&self) -> Option<SourceId> {
        match self {
            Self::SourceCreated { source_id, .. }
            | Self::TranscriptionStatusChanged { source_id, .. }
            | Self::SourceReady { source_id, .. }
            | Self::SummaryGenerated { source_id, .. }
            | Self::SummaryFailed { source_id, .. }
            | Self::SourceDeleted { source_id, .. } => Some(*source_id),
            Self::SpaceDeleted { .. } | Self::MessageAppended { .. } => None,
        }
    }
}
