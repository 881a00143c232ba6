//! Transcription state machine with validated transitions.
//!
//! Enforces the forward-only lifecycle of an audio source:
//! None -> Pending -> Processing -> Done/Error
//! Pending -> Error (submission failure or timeout before start)
//! Error -> Pending (manual re-submission only)

use almanac_core::types::{Source, TranscriptionStatus};
use tracing::debug;

use crate::error::SourceError;
use crate::event::TranscriptionUpdate;

/// A status change applied to a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TranscriptionStatus,
    pub to: TranscriptionStatus,
}

/// Validate that a status transition is allowed.
///
/// Valid transitions:
/// - None -> Pending
/// - Pending -> Processing
/// - Pending -> Error
/// - Processing -> Done
/// - Processing -> Error
/// - Error -> Pending
pub fn validate_transition(
    from: TranscriptionStatus,
    to: TranscriptionStatus,
) -> Result<(), SourceError> {
    let valid = matches!(
        (from, to),
        (TranscriptionStatus::None, TranscriptionStatus::Pending)
            | (TranscriptionStatus::Pending, TranscriptionStatus::Processing)
            | (TranscriptionStatus::Pending, TranscriptionStatus::Error)
            | (TranscriptionStatus::Processing, TranscriptionStatus::Done)
            | (TranscriptionStatus::Processing, TranscriptionStatus::Error)
            | (TranscriptionStatus::Error, TranscriptionStatus::Pending)
    );

    if valid {
        Ok(())
    } else {
        Err(SourceError::InvalidTransition(from, to))
    }
}

fn step(source: &mut Source, to: TranscriptionStatus, applied: &mut Vec<Transition>) -> bool {
    let from = source.transcription_status;
    if validate_transition(from, to).is_err() {
        return false;
    }
    source.transcription_status = to;
    applied.push(Transition { from, to });
    true
}

/// Apply a gateway update to a source and return the transitions made.
///
/// Duplicate, late and out-of-order updates are no-ops: a terminal source
/// never changes, a repeated start is ignored and a completion observed
/// while pending passes through processing. Content is written exactly
/// when the source reaches `done`.
pub fn apply_update(source: &mut Source, update: &TranscriptionUpdate) -> Vec<Transition> {
    let mut applied = Vec::new();
    let status = source.transcription_status;

    if !status.is_in_flight() {
        debug!(
            source_id = %source.id,
            status = %status,
            update = update.name(),
            "Ignoring transcription update for settled source"
        );
        return applied;
    }

    match update {
        TranscriptionUpdate::Started => {
            if status == TranscriptionStatus::Pending {
                step(source, TranscriptionStatus::Processing, &mut applied);
            }
        }
        TranscriptionUpdate::Completed { transcript } => {
            if status == TranscriptionStatus::Pending {
                step(source, TranscriptionStatus::Processing, &mut applied);
            }
            if step(source, TranscriptionStatus::Done, &mut applied) {
                source.content = Some(transcript.text.trim().to_string());
                source.speakers = transcript.speaker_labels();
                source.duration_seconds = transcript.duration();
            }
        }
        TranscriptionUpdate::Failed { .. } => {
            step(source, TranscriptionStatus::Error, &mut applied);
        }
    }

    if !applied.is_empty() {
        source.touch();
    }
    applied
}
