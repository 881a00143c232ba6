//! Almanac Sources crate - the source lifecycle.
//!
//! Turns an ingested artifact into ready, searchable, summarized content:
//! - Transcription state machine with validated, forward-only transitions
//! - Poll loop and webhook entry feeding the same transcription events
//! - Job age ceiling and stale-job sweep
//! - Summarization once content is ready, failing closed
//! - Summary model registry and cascade deletion

pub mod error;
pub mod event;
pub mod manager;
pub mod models;
pub mod state_machine;

pub use error::SourceError;
pub use event::{TranscriptionEvent, TranscriptionUpdate};
pub use manager::{NewSource, SourceLifecycleManager, SourcePayload, SpaceDeletion};
pub use models::NewSummaryModel;
pub use state_machine::{apply_update, validate_transition, Transition};
