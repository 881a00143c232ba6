//! Speech-to-text gateway contract.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Reference to an uploaded audio artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    /// Storage key of the uploaded file.
    pub file_key: String,
    pub mime: String,
    pub size: u64,
}

/// A time-aligned span of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: Option<String>,
    pub text: String,
}

/// A finished transcript as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptPayload {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub speakers: Vec<String>,
    pub duration_seconds: Option<f64>,
    pub confidence: Option<f32>,
}

impl TranscriptPayload {
    /// Speaker labels in order of first appearance.
    ///
    /// Uses the explicit speaker list when the provider sends one and
    /// falls back to the labels found on segments.
    pub fn speaker_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        let from_segments = self.segments.iter().filter_map(|s| s.speaker.as_ref());
        let candidates: Vec<&String> = if self.speakers.is_empty() {
            from_segments.collect()
        } else {
            self.speakers.iter().collect()
        };
        for label in candidates {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    /// Duration reported by the provider, or the end of the last segment.
    pub fn duration(&self) -> Option<f64> {
        self.duration_seconds
            .or_else(|| self.segments.iter().map(|s| s.end).reduce(f64::max))
    }
}

/// State of a transcription job as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// Accepted, not started.
    Queued,
    Processing,
    Completed(TranscriptPayload),
    /// The provider gave up; distinct from "still working".
    Failed(String),
}

/// Converts audio into text asynchronously.
#[async_trait]
pub trait TranscriptionGateway: Send + Sync {
    /// Provider name recorded on the source.
    fn provider(&self) -> &str;

    /// Submit an audio artifact and return the provider's job id.
    async fn submit(&self, audio: &AudioRef) -> Result<String, GatewayError>;

    /// Read the current state of a job.
    async fn poll_status(&self, job_id: &str) -> Result<JobState, GatewayError>;
}

// =============================================================================
// Scripted implementation
// =============================================================================

/// Transcription gateway driven by the caller.
///
/// Jobs stay `Queued` until a test or an offline runner moves them with
/// [`start`](Self::start), [`complete`](Self::complete) or
/// [`fail`](Self::fail).
#[derive(Debug, Default)]
pub struct ScriptedTranscriptionGateway {
    jobs: Mutex<HashMap<String, JobState>>,
    submitted: Mutex<Vec<AudioRef>>,
    reject_submissions: Mutex<Option<String>>,
}

impl ScriptedTranscriptionGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `submit` call fail with `reason`.
    pub fn reject_submissions(&self, reason: &str) {
        if let Ok(mut slot) = self.reject_submissions.lock() {
            *slot = Some(reason.to_string());
        }
    }

    pub fn start(&self, job_id: &str) {
        self.set(job_id, JobState::Processing);
    }

    pub fn complete(&self, job_id: &str, payload: TranscriptPayload) {
        self.set(job_id, JobState::Completed(payload));
    }

    pub fn fail(&self, job_id: &str, reason: &str) {
        self.set(job_id, JobState::Failed(reason.to_string()));
    }

    /// Job ids in submission order.
    pub fn job_ids(&self) -> Vec<String> {
        let count = self.submitted.lock().map(|s| s.len()).unwrap_or(0);
        (1..=count).map(job_id_for).collect()
    }

    fn set(&self, job_id: &str, state: JobState) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(job_id.to_string(), state);
        }
    }

    fn lock_err<T>(e: std::sync::PoisonError<T>) -> GatewayError {
        GatewayError::Unavailable(format!("scripted gateway lock poisoned: {}", e))
    }
}

fn job_id_for(n: usize) -> String {
    format!("job-{}", n)
}

#[async_trait]
impl TranscriptionGateway for ScriptedTranscriptionGateway {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, audio: &AudioRef) -> Result<String, GatewayError> {
        if let Some(reason) = self.reject_submissions.lock().map_err(Self::lock_err)?.clone() {
            return Err(GatewayError::RequestFailed(reason));
        }
        let job_id = {
            let mut submitted = self.submitted.lock().map_err(Self::lock_err)?;
            submitted.push(audio.clone());
            job_id_for(submitted.len())
        };
        self.jobs
            .lock()
            .map_err(Self::lock_err)?
            .insert(job_id.clone(), JobState::Queued);
        tracing::debug!(job_id = %job_id, file_key = %audio.file_key, "Scripted transcription job submitted");
        Ok(job_id)
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobState, GatewayError> {
        self.jobs
            .lock()
            .map_err(Self::lock_err)?
            .get(job_id)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownJob(job_id.to_string()))
    }
}
