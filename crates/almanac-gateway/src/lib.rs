//! Almanac Gateway crate - contracts for the external generation and
//! transcription services.
//!
//! Both gateways are constructed once at process start and injected into
//! the components that need them as `Arc<dyn ...>`. Scripted
//! implementations are provided for tests and offline use.

pub mod completion;
pub mod error;
pub mod transcription;

use std::future::Future;
use std::time::Duration;

pub use completion::{Completion, CompletionGateway, ScriptedCompletionGateway};
pub use error::GatewayError;
pub use transcription::{
    AudioRef, JobState, ScriptedTranscriptionGateway, TranscriptPayload, TranscriptSegment,
    TranscriptionGateway,
};

/// Await a gateway call, failing with [`GatewayError::Timeout`] once
/// `limit` elapses.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}
