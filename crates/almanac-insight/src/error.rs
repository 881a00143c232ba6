use almanac_core::AlmanacError;
use almanac_gateway::GatewayError;
use thiserror::Error;

/// Errors that can occur while producing a summary.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("nothing to summarize: content is empty")]
    EmptyContent,
    #[error("completion failed: {0}")]
    Completion(#[from] GatewayError),
    #[error("malformed summary reply: {0}")]
    Malformed(String),
    #[error("summary reply has no content for the requested sections")]
    EmptySummary,
}

impl From<InsightError> for AlmanacError {
    fn from(e: InsightError) -> Self {
        AlmanacError::Completion(e.to_string())
    }
}
