//! Error types for the source lifecycle.

use almanac_core::error::AlmanacError;
use almanac_core::types::{SourceId, TranscriptionStatus};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid transcription transition: {0} -> {1}")]
    InvalidTransition(TranscriptionStatus, TranscriptionStatus),
    #[error("Invalid source: {0}")]
    Invalid(String),
    #[error("Source {0} has no content yet")]
    NotReady(SourceId),
    #[error("Storage error: {0}")]
    Storage(AlmanacError),
}

impl From<AlmanacError> for SourceError {
    fn from(err: AlmanacError) -> Self {
        match err {
            AlmanacError::NotFound { .. } => SourceError::NotFound(err.to_string()),
            AlmanacError::Validation(msg) => SourceError::Invalid(msg),
            other => SourceError::Storage(other),
        }
    }
}

impl From<SourceError> for AlmanacError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Storage(inner) => inner,
            SourceError::Invalid(msg) => AlmanacError::Validation(msg),
            other => AlmanacError::Validation(other.to_string()),
        }
    }
}
