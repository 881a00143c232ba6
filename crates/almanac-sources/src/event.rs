//! Transcription events, independent of how they were delivered.

use almanac_gateway::{JobState, TranscriptPayload};
use serde::{Deserialize, Serialize};

/// What the provider reported about a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TranscriptionUpdate {
    Started,
    Completed { transcript: TranscriptPayload },
    Failed { reason: String },
}

impl TranscriptionUpdate {
    /// Translate a polled job state. `Queued` carries no news.
    pub fn from_job_state(state: JobState) -> Option<Self> {
        match state {
            JobState::Queued => None,
            JobState::Processing => Some(Self::Started),
            JobState::Completed(transcript) => Some(Self::Completed { transcript }),
            JobState::Failed(reason) => Some(Self::Failed { reason }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A job update produced by either the poll loop or a webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionEvent {
    pub job_id: String,
    #[serde(flatten)]
    pub update: TranscriptionUpdate,
}
