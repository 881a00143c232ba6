use std::time::Duration;

use almanac_core::error::AlmanacError;

/// Errors reported by an external gateway.
///
/// These never cross into caller code: the lifecycle manager and the
/// conversation orchestrator translate them into a source status or a
/// retryable chat error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<GatewayError> for AlmanacError {
    fn from(err: GatewayError) -> Self {
        AlmanacError::Completion(err.to_string())
    }
}
