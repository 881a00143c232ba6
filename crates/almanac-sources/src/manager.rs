//! Source lifecycle management.
//!
//! Owns creation, transcription progress, readiness, summarization and
//! deletion of sources. Gateway failures stop here: callers only ever see
//! a transcription status or a missing summary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use almanac_core::config::{SummarizationConfig, TranscriptionConfig};
use almanac_core::error::AlmanacError;
use almanac_core::types::{
    FileMetadata, Source, SourceId, SourceType, SpaceId, SummaryModelId, Timestamp,
    TranscriptionStatus,
};
use almanac_core::{AlmanacConfig, DomainEvent};
use almanac_gateway::{
    with_timeout, AudioRef, CompletionGateway, GatewayError, JobState, TranscriptionGateway,
};
use almanac_insight::SummarizationService;
use almanac_search::ContentIndex;
use almanac_storage::RecordStore;

use crate::error::SourceError;
use crate::event::{TranscriptionEvent, TranscriptionUpdate};
use crate::state_machine::{apply_update, validate_transition};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What a new source is created from.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    /// Inline content; the source is ready at once.
    Text(String),
    /// An uploaded recording to transcribe.
    Audio(AudioRef),
}

#[derive(Debug, Clone)]
pub struct NewSource {
    pub space_id: SpaceId,
    pub name: String,
    pub source_type: SourceType,
    pub payload: SourcePayload,
}

/// What a space deletion removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceDeletion {
    pub sources_removed: usize,
    pub conversations_removed: usize,
    pub summary_models_removed: usize,
}

/// Drives every source from ingestion to ready content.
///
/// Cheap to clone; background transcription and summarization tasks hold
/// their own clone. Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct SourceLifecycleManager {
    pub(crate) store: Arc<RecordStore>,
    index: Arc<ContentIndex>,
    transcriber: Arc<dyn TranscriptionGateway>,
    summarizer: Arc<SummarizationService>,
    transcription: TranscriptionConfig,
    summarization: SummarizationConfig,
    events: broadcast::Sender<DomainEvent>,
    /// Outstanding provider jobs, by job id.
    jobs: Arc<Mutex<HashMap<String, SourceId>>>,
}

impl SourceLifecycleManager {
    pub fn new(
        store: Arc<RecordStore>,
        index: Arc<ContentIndex>,
        transcriber: Arc<dyn TranscriptionGateway>,
        completer: Arc<dyn CompletionGateway>,
        config: &AlmanacConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            index,
            transcriber,
            summarizer: Arc::new(SummarizationService::new(
                completer,
                config.summarization.clone(),
            )),
            transcription: config.transcription.clone(),
            summarization: config.summarization.clone(),
            events,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Receive every domain event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Sender for other components publishing on the same channel.
    pub fn event_sender(&self) -> broadcast::Sender<DomainEvent> {
        self.events.clone()
    }

    pub(crate) fn publish(&self, event: DomainEvent) {
        // No subscriber is not an error.
        let _ = self.events.send(event);
    }

    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<String, SourceId>>, AlmanacError> {
        self.jobs
            .lock()
            .map_err(|e| AlmanacError::Storage(format!("job map lock poisoned: {}", e)))
    }

    fn forget_job(&self, source: &Source) {
        if let (Some(job_id), Ok(mut jobs)) = (&source.transcription_job_id, self.jobs.lock()) {
            jobs.remove(job_id);
        }
    }

    pub fn get_source(&self, id: SourceId) -> Result<Source, SourceError> {
        Ok(self.store.get_source(id)?)
    }

    pub fn list_sources(&self, space_id: SpaceId) -> Result<Vec<Source>, SourceError> {
        Ok(self.store.list_sources(space_id)?)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a source.
    ///
    /// Inline content makes the source ready immediately. An audio payload
    /// leaves it `pending` and submits the transcription in the
    /// background; this call never waits on the gateway.
    pub async fn create_source(&self, new: NewSource) -> Result<Source, SourceError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(SourceError::Invalid("source name is empty".to_string()));
        }

        let now = Timestamp::now();
        let mut source = Source {
            id: SourceId::new(),
            space_id: new.space_id,
            name: name.to_string(),
            source_type: new.source_type,
            content: None,
            summary: None,
            summary_model_ref: None,
            summary_tokens: None,
            transcription_status: TranscriptionStatus::None,
            transcription_provider: None,
            transcription_job_id: None,
            transcription_submitted_at: None,
            duration_seconds: None,
            speakers: Vec::new(),
            file: None,
            created_at: now,
            updated_at: now,
        };

        match new.payload {
            SourcePayload::Text(content) => {
                if content.trim().is_empty() {
                    return Err(SourceError::Invalid("source content is empty".to_string()));
                }
                source.content = Some(content);
                self.store.insert_source(source.clone())?;
                self.publish_created(&source);
                self.store.update_source(source.id, |s| self.index.upsert(s))?;
                self.mark_ready(&source);
            }
            SourcePayload::Audio(audio) => {
                if !source.source_type.accepts_audio() {
                    return Err(SourceError::Invalid(format!(
                        "{} sources cannot carry audio",
                        source.source_type
                    )));
                }
                source.file = Some(file_metadata(&audio));
                source.transcription_status = TranscriptionStatus::Pending;
                source.transcription_provider = Some(self.transcriber.provider().to_string());
                source.transcription_submitted_at = Some(now);
                self.store.insert_source(source.clone())?;
                self.publish_created(&source);
                self.publish(DomainEvent::TranscriptionStatusChanged {
                    source_id: source.id,
                    from: TranscriptionStatus::None,
                    to: TranscriptionStatus::Pending,
                    timestamp: now,
                });
                tokio::spawn(self.clone().run_transcription(source.id, audio, now));
            }
        }

        info!(
            source_id = %source.id,
            space_id = %source.space_id,
            source_type = %source.source_type,
            status = %source.transcription_status,
            "Source created"
        );
        Ok(source)
    }

    fn publish_created(&self, source: &Source) {
        self.publish(DomainEvent::SourceCreated {
            source_id: source.id,
            space_id: source.space_id,
            source_type: source.source_type,
            timestamp: source.created_at,
        });
    }

    /// Announce a source whose content just became available and queue its
    /// summary.
    ///
    /// The caller indexes the source while holding the store write lock, so
    /// a concurrent deletion cannot be undone by a late index write.
    fn mark_ready(&self, source: &Source) {
        self.publish(DomainEvent::SourceReady {
            source_id: source.id,
            space_id: source.space_id,
            word_count: source.word_count(),
            timestamp: Timestamp::now(),
        });
        if self.summarization.auto_summarize {
            let manager = self.clone();
            let id = source.id;
            tokio::spawn(async move {
                if let Err(e) = manager.summarize_source(id, None).await {
                    debug!(source_id = %id, error = %e, "Automatic summarization skipped");
                }
            });
        }
    }

    // =========================================================================
    // Transcription
    // =========================================================================

    /// Submit the audio, then poll the job until the source settles.
    ///
    /// `attempt` is the submission time recorded on the source; a newer
    /// submission makes this run stand down.
    async fn run_transcription(self, id: SourceId, audio: AudioRef, attempt: Timestamp) {
        let submitted = with_timeout(
            self.transcription.request_timeout(),
            self.transcriber.submit(&audio),
        )
        .await;

        let job_id = match submitted {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!(source_id = %id, error = %e, "Transcription submission failed");
                let _ = self.fail_transcription(id, None, e.to_string());
                return;
            }
        };

        let attached = self.store.update_source(id, |s| {
            if s.transcription_submitted_at != Some(attempt)
                || s.transcription_status != TranscriptionStatus::Pending
            {
                return Err(AlmanacError::Validation(
                    "source is no longer waiting for this submission".to_string(),
                ));
            }
            // Registered before the job id becomes visible on the source.
            self.jobs()?.insert(job_id.clone(), id);
            s.transcription_job_id = Some(job_id.clone());
            Ok(())
        });
        if let Err(e) = attached {
            debug!(source_id = %id, job_id = %job_id, error = %e, "Dropping transcription job");
            return;
        }
        debug!(source_id = %id, job_id = %job_id, "Transcription job submitted");

        self.poll_job(id, job_id).await;
    }

    async fn poll_job(&self, id: SourceId, job_id: String) {
        loop {
            tokio::time::sleep(self.transcription.poll_interval()).await;

            let Ok(source) = self.store.get_source(id) else {
                debug!(source_id = %id, "Source removed, polling stopped");
                return;
            };
            if source.transcription_job_id.as_deref() != Some(job_id.as_str())
                || !source.transcription_status.is_in_flight()
            {
                return;
            }
            if self.job_expired(&source) {
                warn!(source_id = %id, job_id = %job_id, "Transcription job timed out");
                let _ = self.fail_transcription(id, Some(&job_id), self.timeout_reason());
                return;
            }

            let polled = with_timeout(
                self.transcription.request_timeout(),
                self.transcriber.poll_status(&job_id),
            )
            .await;
            match polled {
                Ok(state) => {
                    let Some(update) = TranscriptionUpdate::from_job_state(state) else {
                        continue;
                    };
                    let event = TranscriptionEvent {
                        job_id: job_id.clone(),
                        update,
                    };
                    match self.handle_transcription_event(event) {
                        Ok(Some(s)) if s.transcription_status.is_terminal() => return,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(source_id = %id, error = %e, "Transcription update failed");
                            return;
                        }
                    }
                }
                Err(GatewayError::UnknownJob(_)) => {
                    warn!(source_id = %id, job_id = %job_id, "Provider lost the transcription job");
                    let _ = self.fail_transcription(id, Some(&job_id), "unknown job".to_string());
                    return;
                }
                Err(e) => {
                    debug!(source_id = %id, error = %e, "Transcription poll failed, retrying");
                }
            }
        }
    }

    fn job_expired(&self, source: &Source) -> bool {
        let ceiling =
            i64::try_from(self.transcription.job_timeout().as_millis()).unwrap_or(i64::MAX);
        source
            .transcription_submitted_at
            .is_some_and(|t| Timestamp::now().0.saturating_sub(t.0) >= ceiling)
    }

    fn timeout_reason(&self) -> String {
        format!(
            "no transcript after {} seconds",
            self.transcription.job_timeout_secs
        )
    }

    fn fail_transcription(
        &self,
        id: SourceId,
        job_id: Option<&str>,
        reason: String,
    ) -> Result<Source, SourceError> {
        self.apply_to_source(id, job_id, &TranscriptionUpdate::Failed { reason })
    }

    /// Feed a provider event into the state machine.
    ///
    /// This is the webhook entry point; the poll loop goes through it too.
    /// Events for unknown or superseded jobs are ignored and yield `None`.
    pub fn handle_transcription_event(
        &self,
        event: TranscriptionEvent,
    ) -> Result<Option<Source>, SourceError> {
        let source_id = self.jobs()?.get(&event.job_id).copied();
        let Some(source_id) = source_id else {
            debug!(job_id = %event.job_id, update = event.update.name(), "Ignoring event for unknown job");
            return Ok(None);
        };
        self.apply_to_source(source_id, Some(&event.job_id), &event.update)
            .map(Some)
    }

    /// Apply an update under the store lock, then publish its effects.
    ///
    /// With `job_id` set, the update only applies while that job is still
    /// the source's current one.
    fn apply_to_source(
        &self,
        id: SourceId,
        job_id: Option<&str>,
        update: &TranscriptionUpdate,
    ) -> Result<Source, SourceError> {
        let (source, transitions) = self.store.update_source(id, |s| {
            if job_id.is_some_and(|job| s.transcription_job_id.as_deref() != Some(job)) {
                return Ok((s.clone(), Vec::new()));
            }
            let transitions = apply_update(s, update);
            if transitions.last().is_some_and(|t| t.to == TranscriptionStatus::Done) {
                self.index.upsert(s)?;
            }
            Ok((s.clone(), transitions))
        })?;

        for t in &transitions {
            info!(source_id = %id, from = %t.from, to = %t.to, "Transcription status changed");
            self.publish(DomainEvent::TranscriptionStatusChanged {
                source_id: id,
                from: t.from,
                to: t.to,
                timestamp: source.updated_at,
            });
        }

        if let Some(last) = transitions.last() {
            match last.to {
                TranscriptionStatus::Done => {
                    self.forget_job(&source);
                    self.mark_ready(&source);
                }
                TranscriptionStatus::Error => {
                    self.forget_job(&source);
                    if let TranscriptionUpdate::Failed { reason } = update {
                        warn!(source_id = %id, reason = %reason, "Transcription failed");
                    }
                }
                _ => {}
            }
        }
        Ok(source)
    }

    /// Current transcription status of a source.
    ///
    /// The only side effect is the `pending -> processing` observation
    /// when the provider reports the job as started.
    pub async fn get_source_status(&self, id: SourceId) -> Result<TranscriptionStatus, SourceError> {
        let source = self.store.get_source(id)?;
        let status = source.transcription_status;
        if status != TranscriptionStatus::Pending {
            return Ok(status);
        }
        let Some(job_id) = source.transcription_job_id else {
            return Ok(status);
        };

        let polled = with_timeout(
            self.transcription.request_timeout(),
            self.transcriber.poll_status(&job_id),
        )
        .await;
        match polled {
            Ok(JobState::Processing) | Ok(JobState::Completed(_)) => {
                let source =
                    self.apply_to_source(id, Some(&job_id), &TranscriptionUpdate::Started)?;
                Ok(source.transcription_status)
            }
            Ok(_) => Ok(status),
            Err(e) => {
                debug!(source_id = %id, error = %e, "Status poll failed");
                Ok(status)
            }
        }
    }

    /// Restart transcription of a failed source with a new upload.
    pub fn resubmit_transcription(&self, id: SourceId, audio: AudioRef) -> Result<Source, SourceError> {
        let current = self.store.get_source(id)?;
        if !current.source_type.accepts_audio() {
            return Err(SourceError::Invalid(format!(
                "{} sources cannot carry audio",
                current.source_type
            )));
        }
        validate_transition(current.transcription_status, TranscriptionStatus::Pending)?;

        let now = Timestamp::now();
        let provider = self.transcriber.provider().to_string();
        let source = self.store.update_source(id, |s| {
            if s.transcription_status != TranscriptionStatus::Error {
                return Err(AlmanacError::Validation(format!(
                    "cannot resubmit a {} source",
                    s.transcription_status
                )));
            }
            s.transcription_status = TranscriptionStatus::Pending;
            s.transcription_job_id = None;
            s.transcription_submitted_at = Some(now);
            s.transcription_provider = Some(provider);
            s.file = Some(file_metadata(&audio));
            s.updated_at = now;
            Ok(s.clone())
        })?;

        self.publish(DomainEvent::TranscriptionStatusChanged {
            source_id: id,
            from: TranscriptionStatus::Error,
            to: TranscriptionStatus::Pending,
            timestamp: now,
        });
        info!(source_id = %id, "Transcription resubmitted");
        tokio::spawn(self.clone().run_transcription(id, audio, now));
        Ok(source)
    }

    /// Fail every outstanding job older than the configured ceiling.
    pub fn expire_stale_jobs(&self) -> Result<Vec<SourceId>, SourceError> {
        let mut expired = Vec::new();
        for source in self.store.in_flight_sources()? {
            if !self.job_expired(&source) {
                continue;
            }
            match self.fail_transcription(source.id, None, self.timeout_reason()) {
                Ok(s) if s.transcription_status == TranscriptionStatus::Error => {
                    expired.push(s.id)
                }
                Ok(_) | Err(SourceError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired stale transcription jobs");
        }
        Ok(expired)
    }

    // =========================================================================
    // Summarization
    // =========================================================================

    /// Generate (or regenerate) the summary of a ready source.
    ///
    /// `model` picks a summary model; `None` resolves the space default.
    /// Returns `Ok(None)` when generation or parsing fails: the failure is
    /// logged and published, the stored summary is left untouched and the
    /// source is not marked as errored.
    pub async fn summarize_source(
        &self,
        id: SourceId,
        model: Option<SummaryModelId>,
    ) -> Result<Option<String>, SourceError> {
        let source = self.store.get_source(id)?;
        let Some(content) = source.content else {
            return Err(SourceError::NotReady(id));
        };
        let model_ref = self.resolve_summary_model(source.space_id, model)?;

        let generated = match self.summarizer.summarize(&content, &model_ref.config).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!(source_id = %id, model = %model_ref.name, error = %e, "Summarization failed");
                self.publish(DomainEvent::SummaryFailed {
                    source_id: id,
                    reason: e.to_string(),
                    timestamp: Timestamp::now(),
                });
                return Ok(None);
            }
        };

        let updated = self.store.update_source(id, |s| {
            s.summary = Some(generated.text.clone());
            s.summary_model_ref = Some(model_ref.clone());
            s.summary_tokens = Some(generated.tokens_used);
            s.touch();
            self.index.upsert(s)?;
            Ok(s.clone())
        })?;

        info!(
            source_id = %id,
            model = %model_ref.name,
            tokens_used = generated.tokens_used,
            "Source summarized"
        );
        self.publish(DomainEvent::SummaryGenerated {
            source_id: id,
            tokens_used: generated.tokens_used,
            timestamp: updated.updated_at,
        });
        Ok(Some(generated.text))
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    pub fn delete_source(&self, id: SourceId) -> Result<Source, SourceError> {
        let source = self.store.remove_source(id)?;
        self.index.remove(source.space_id, id)?;
        self.forget_job(&source);
        self.publish(DomainEvent::SourceDeleted {
            source_id: id,
            space_id: source.space_id,
            timestamp: Timestamp::now(),
        });
        info!(source_id = %id, "Source deleted");
        Ok(source)
    }

    /// Delete everything a space owns: sources, index entries,
    /// conversations with their messages, and its summary models.
    pub fn delete_space(&self, space_id: SpaceId) -> Result<SpaceDeletion, SourceError> {
        let sources = self.store.remove_space_sources(space_id)?;
        self.index.remove_space(space_id)?;
        self.jobs()?.retain(|_, source_id| !sources.contains(source_id));
        let conversations = self.store.remove_space_conversations(space_id)?;
        let summary_models_removed = self.store.remove_space_summary_models(space_id)?;

        let deletion = SpaceDeletion {
            sources_removed: sources.len(),
            conversations_removed: conversations.len(),
            summary_models_removed,
        };
        self.publish(DomainEvent::SpaceDeleted {
            space_id,
            sources_removed: deletion.sources_removed,
            conversations_removed: deletion.conversations_removed,
            timestamp: Timestamp::now(),
        });
        info!(
            space_id = %space_id,
            sources = deletion.sources_removed,
            conversations = deletion.conversations_removed,
            "Space deleted"
        );
        Ok(deletion)
    }
}

fn file_metadata(audio: &AudioRef) -> FileMetadata {
    FileMetadata {
        key: audio.file_key.clone(),
        size: audio.size,
        mime: audio.mime.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use almanac_core::types::{Conversation, ConversationId, SummaryConfig};
    use almanac_gateway::{ScriptedCompletionGateway, ScriptedTranscriptionGateway, TranscriptPayload};
    use almanac_search::SearchScope;

    use crate::models::NewSummaryModel;

    const SUMMARY_REPLY: &str =
        r#"{"keyPoints": ["Greeting exchanged"], "decisions": [], "sentiment": "positive"}"#;

    struct Fixture {
        manager: SourceLifecycleManager,
        index: Arc<ContentIndex>,
        transcriber: Arc<ScriptedTranscriptionGateway>,
        completer: Arc<ScriptedCompletionGateway>,
    }

    fn fixture_with(config: AlmanacConfig, completer: ScriptedCompletionGateway) -> Fixture {
        let store = Arc::new(RecordStore::new());
        let index = Arc::new(ContentIndex::new(config.search.clone()));
        let transcriber = Arc::new(ScriptedTranscriptionGateway::new());
        let completer = Arc::new(completer);
        let manager = SourceLifecycleManager::new(
            store,
            index.clone(),
            transcriber.clone(),
            completer.clone(),
            &config,
        );
        Fixture {
            manager,
            index,
            transcriber,
            completer,
        }
    }

    fn config(poll_interval_ms: u64, job_timeout_secs: u64, auto_summarize: bool) -> AlmanacConfig {
        let mut config = AlmanacConfig::default();
        config.transcription.poll_interval_ms = poll_interval_ms;
        config.transcription.job_timeout_secs = job_timeout_secs;
        config.transcription.request_timeout_secs = 1;
        config.summarization.auto_summarize = auto_summarize;
        config.summarization.request_timeout_secs = 1;
        config
    }

    fn fixture(poll_interval_ms: u64, auto_summarize: bool) -> Fixture {
        fixture_with(
            config(poll_interval_ms, 1_800, auto_summarize),
            ScriptedCompletionGateway::replying(SUMMARY_REPLY),
        )
    }

    fn audio() -> AudioRef {
        AudioRef {
            file_key: "uploads/standup.m4a".to_string(),
            mime: "audio/mp4".to_string(),
            size: 2048,
        }
    }

    fn text_source(space_id: SpaceId, name: &str, content: &str) -> NewSource {
        NewSource {
            space_id,
            name: name.to_string(),
            source_type: SourceType::Text,
            payload: SourcePayload::Text(content.to_string()),
        }
    }

    fn audio_source(space_id: SpaceId) -> NewSource {
        NewSource {
            space_id,
            name: "Standup".to_string(),
            source_type: SourceType::Meeting,
            payload: SourcePayload::Audio(audio()),
        }
    }

    fn transcript(text: &str) -> TranscriptPayload {
        TranscriptPayload {
            text: text.to_string(),
            segments: vec![],
            speakers: vec!["Ana".to_string(), "Marc".to_string()],
            duration_seconds: Some(3.5),
            confidence: Some(0.92),
        }
    }

    async fn wait_for<F>(manager: &SourceLifecycleManager, id: SourceId, cond: F) -> Source
    where
        F: Fn(&Source) -> bool,
    {
        for _ in 0..300 {
            let source = manager.get_source(id).unwrap();
            if cond(&source) {
                return source;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("source {} never reached the expected state", id);
    }

    async fn wait_for_job(manager: &SourceLifecycleManager, id: SourceId) -> String {
        wait_for(manager, id, |s| s.transcription_job_id.is_some())
            .await
            .transcription_job_id
            .unwrap()
    }

    // =====================================================================
    // Text sources
    // =====================================================================

    #[tokio::test]
    async fn test_text_source_ready_immediately() {
        let f = fixture(10, false);
        let space = SpaceId::new();
        let source = f
            .manager
            .create_source(text_source(space, "Budget Q1", "we approved the budget increase"))
            .await
            .unwrap();

        assert_eq!(source.transcription_status, TranscriptionStatus::None);
        assert!(source.is_ready());
        let results = f.index.search(space, "budget", SearchScope::All, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert!(f.transcriber.job_ids().is_empty());
        assert_eq!(f.completer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_sources_are_rejected() {
        let f = fixture(10, false);
        let space = SpaceId::new();

        let empty = f.manager.create_source(text_source(space, "x", "   ")).await;
        assert!(matches!(empty, Err(SourceError::Invalid(_))));

        let unnamed = f.manager.create_source(text_source(space, " ", "content")).await;
        assert!(matches!(unnamed, Err(SourceError::Invalid(_))));

        let mut audio_doc = audio_source(space);
        audio_doc.source_type = SourceType::Document;
        let result = f.manager.create_source(audio_doc).await;
        assert!(matches!(result, Err(SourceError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_text_source_auto_summarized() {
        let f = fixture(10, true);
        let source = f
            .manager
            .create_source(text_source(SpaceId::new(), "notes", "hello there"))
            .await
            .unwrap();

        let summarized = wait_for(&f.manager, source.id, |s| s.summary.is_some()).await;
        assert!(summarized.summary.unwrap().contains("Greeting exchanged"));
        assert_eq!(
            summarized.summary_model_ref.unwrap().name,
            almanac_core::types::SummaryModelRef::BUILTIN_NAME
        );
        assert_eq!(summarized.transcription_status, TranscriptionStatus::None);
    }

    // =====================================================================
    // Audio sources
    // =====================================================================

    #[tokio::test]
    async fn test_audio_source_polled_to_done() {
        let f = fixture(10, false);
        let space = SpaceId::new();
        let source = f.manager.create_source(audio_source(space)).await.unwrap();
        assert_eq!(source.transcription_status, TranscriptionStatus::Pending);
        assert!(source.content.is_none());
        assert_eq!(source.transcription_provider.as_deref(), Some("scripted"));

        let job = wait_for_job(&f.manager, source.id).await;
        f.transcriber.start(&job);
        wait_for(&f.manager, source.id, |s| {
            s.transcription_status == TranscriptionStatus::Processing
        })
        .await;

        f.transcriber.complete(&job, transcript("hello world"));
        let done = wait_for(&f.manager, source.id, |s| {
            s.transcription_status == TranscriptionStatus::Done
        })
        .await;

        assert_eq!(done.content.as_deref(), Some("hello world"));
        assert_eq!(done.speakers, vec!["Ana", "Marc"]);
        assert_eq!(done.duration_seconds, Some(3.5));
        assert_eq!(f.index.search(space, "hello", SearchScope::All, 0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_delivery_and_late_events() {
        let f = fixture(60_000, false);
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
        let job = wait_for_job(&f.manager, source.id).await;

        let started = TranscriptionEvent {
            job_id: job.clone(),
            update: TranscriptionUpdate::Started,
        };
        f.manager.handle_transcription_event(started.clone()).unwrap();
        f.manager.handle_transcription_event(started.clone()).unwrap();
        assert_eq!(
            f.manager.get_source(source.id).unwrap().transcription_status,
            TranscriptionStatus::Processing
        );

        let done = f
            .manager
            .handle_transcription_event(TranscriptionEvent {
                job_id: job.clone(),
                update: TranscriptionUpdate::Completed {
                    transcript: transcript("hello world"),
                },
            })
            .unwrap();
        assert!(done.is_some());

        // Late events for a finished job are ignored.
        let late = f
            .manager
            .handle_transcription_event(TranscriptionEvent {
                job_id: job,
                update: TranscriptionUpdate::Failed {
                    reason: "late".to_string(),
                },
            })
            .unwrap();
        assert!(late.is_none());
        f.manager.handle_transcription_event(started).unwrap();

        let source = f.manager.get_source(source.id).unwrap();
        assert_eq!(source.transcription_status, TranscriptionStatus::Done);
        assert_eq!(source.content.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn test_unknown_job_event_is_ignored() {
        let f = fixture(60_000, false);
        let result = f
            .manager
            .handle_transcription_event(TranscriptionEvent {
                job_id: "job-404".to_string(),
                update: TranscriptionUpdate::Started,
            })
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_submission_failure_marks_error() {
        let f = fixture(10, true);
        f.transcriber.reject_submissions("quota exceeded");
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();

        let failed = wait_for(&f.manager, source.id, |s| {
            s.transcription_status == TranscriptionStatus::Error
        })
        .await;
        assert!(failed.content.is_none());
        assert_eq!(f.completer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_marks_error() {
        let f = fixture(10, false);
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
        let job = wait_for_job(&f.manager, source.id).await;
        f.transcriber.start(&job);
        f.transcriber.fail(&job, "unsupported codec");

        let failed = wait_for(&f.manager, source.id, |s| {
            s.transcription_status == TranscriptionStatus::Error
        })
        .await;
        assert!(failed.content.is_none());
    }

    #[tokio::test]
    async fn test_job_age_ceiling_marks_error_without_summarizing() {
        let f = fixture_with(
            config(10, 0, true),
            ScriptedCompletionGateway::replying(SUMMARY_REPLY),
        );
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();

        let failed = wait_for(&f.manager, source.id, |s| {
            s.transcription_status == TranscriptionStatus::Error
        })
        .await;
        assert!(failed.content.is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.completer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_status_poll_observes_processing_only() {
        let f = fixture(60_000, false);
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
        let job = wait_for_job(&f.manager, source.id).await;

        assert_eq!(
            f.manager.get_source_status(source.id).await.unwrap(),
            TranscriptionStatus::Pending
        );

        f.transcriber.complete(&job, transcript("hello world"));
        assert_eq!(
            f.manager.get_source_status(source.id).await.unwrap(),
            TranscriptionStatus::Processing
        );
        assert_eq!(
            f.manager.get_source_status(source.id).await.unwrap(),
            TranscriptionStatus::Processing
        );
        assert!(f.manager.get_source(source.id).unwrap().content.is_none());
    }

    #[tokio::test]
    async fn test_resubmission_after_error() {
        let f = fixture(60_000, false);
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
        let first_job = wait_for_job(&f.manager, source.id).await;
        f.manager
            .handle_transcription_event(TranscriptionEvent {
                job_id: first_job.clone(),
                update: TranscriptionUpdate::Failed {
                    reason: "network".to_string(),
                },
            })
            .unwrap();

        let resubmitted = f.manager.resubmit_transcription(source.id, audio()).unwrap();
        assert_eq!(resubmitted.transcription_status, TranscriptionStatus::Pending);

        let second_job = wait_for(&f.manager, source.id, |s| {
            s.transcription_job_id.as_deref().is_some_and(|j| j != first_job)
        })
        .await
        .transcription_job_id
        .unwrap();

        // The abandoned job no longer drives the source.
        let stale = f
            .manager
            .handle_transcription_event(TranscriptionEvent {
                job_id: first_job,
                update: TranscriptionUpdate::Completed {
                    transcript: transcript("stale"),
                },
            })
            .unwrap();
        assert!(stale.is_none());

        f.manager
            .handle_transcription_event(TranscriptionEvent {
                job_id: second_job,
                update: TranscriptionUpdate::Completed {
                    transcript: transcript("fresh"),
                },
            })
            .unwrap();
        let source = f.manager.get_source(source.id).unwrap();
        assert_eq!(source.content.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_resubmission_requires_error() {
        let f = fixture(60_000, false);
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
        let result = f.manager.resubmit_transcription(source.id, audio());
        assert!(matches!(result, Err(SourceError::InvalidTransition(_, _))));
    }

    #[tokio::test]
    async fn test_expire_stale_jobs() {
        let f = fixture_with(
            config(60_000, 0, false),
            ScriptedCompletionGateway::replying(SUMMARY_REPLY),
        );
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
        let text = f
            .manager
            .create_source(text_source(SpaceId::new(), "t", "text"))
            .await
            .unwrap();

        let expired = f.manager.expire_stale_jobs().unwrap();
        assert_eq!(expired, vec![source.id]);
        assert_eq!(
            f.manager.get_source(source.id).unwrap().transcription_status,
            TranscriptionStatus::Error
        );
        assert_eq!(
            f.manager.get_source(text.id).unwrap().transcription_status,
            TranscriptionStatus::None
        );
        assert!(f.manager.expire_stale_jobs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_huge_job_timeout_never_expires() {
        let f = fixture_with(
            config(10, u64::MAX, false),
            ScriptedCompletionGateway::replying(SUMMARY_REPLY),
        );
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
        wait_for_job(&f.manager, source.id).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(f.manager.expire_stale_jobs().unwrap().is_empty());
        assert_eq!(
            f.manager.get_source(source.id).unwrap().transcription_status,
            TranscriptionStatus::Pending
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_webhook_accepted_as_soon_as_job_is_visible() {
        for _ in 0..20 {
            let f = fixture(60_000, false);
            let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
            let job_id = loop {
                if let Some(job_id) = f.manager.get_source(source.id).unwrap().transcription_job_id {
                    break job_id;
                }
                tokio::task::yield_now().await;
            };

            let applied = f
                .manager
                .handle_transcription_event(TranscriptionEvent {
                    job_id,
                    update: TranscriptionUpdate::Started,
                })
                .unwrap()
                .expect("event for a visible job is applied");
            assert_eq!(applied.transcription_status, TranscriptionStatus::Processing);
        }
    }

    // =====================================================================
    // Summaries
    // =====================================================================

    #[tokio::test]
    async fn test_summary_uses_space_default_model() {
        let f = fixture(10, true);
        let space = SpaceId::new();
        let model = f
            .manager
            .create_summary_model(NewSummaryModel {
                space_id: space,
                name: "Meeting notes".to_string(),
                config: SummaryConfig::default(),
                is_default: true,
                is_shared: false,
            })
            .unwrap();

        let source = f.manager.create_source(audio_source(space)).await.unwrap();
        let job = wait_for_job(&f.manager, source.id).await;
        f.transcriber.complete(&job, transcript("hello world"));

        let summarized = wait_for(&f.manager, source.id, |s| s.summary.is_some()).await;
        let model_ref = summarized.summary_model_ref.unwrap();
        assert_eq!(model_ref.model_id, Some(model.id));
        assert_eq!(model_ref.name, "Meeting notes");
        assert!(summarized.summary_tokens.is_some());
    }

    #[tokio::test]
    async fn test_summary_failure_is_silent() {
        let f = fixture_with(
            config(10, 1_800, false),
            ScriptedCompletionGateway::replying("I could not produce JSON, sorry."),
        );
        let mut events = f.manager.subscribe();
        let source = f
            .manager
            .create_source(text_source(SpaceId::new(), "notes", "hello"))
            .await
            .unwrap();

        let result = f.manager.summarize_source(source.id, None).await.unwrap();
        assert!(result.is_none());
        let source = f.manager.get_source(source.id).unwrap();
        assert!(source.summary.is_none());
        assert_eq!(source.transcription_status, TranscriptionStatus::None);

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names, vec!["source_created", "source_ready", "summary_failed"]);
    }

    #[tokio::test]
    async fn test_summary_regeneration_keeps_old_summary_on_failure() {
        let completer = ScriptedCompletionGateway::replying("not json");
        completer.push_reply(SUMMARY_REPLY);
        let f = fixture_with(config(10, 1_800, false), completer);
        let source = f
            .manager
            .create_source(text_source(SpaceId::new(), "notes", "hello"))
            .await
            .unwrap();

        assert!(f.manager.summarize_source(source.id, None).await.unwrap().is_some());
        assert!(f.manager.summarize_source(source.id, None).await.unwrap().is_none());
        assert!(f.manager.get_source(source.id).unwrap().summary.is_some());
    }

    #[tokio::test]
    async fn test_summarize_pending_source_is_not_ready() {
        let f = fixture(60_000, false);
        let source = f.manager.create_source(audio_source(SpaceId::new())).await.unwrap();
        let result = f.manager.summarize_source(source.id, None).await;
        assert!(matches!(result, Err(SourceError::NotReady(_))));
    }

    // =====================================================================
    // Deletion
    // =====================================================================

    #[tokio::test]
    async fn test_delete_source_removes_from_index() {
        let f = fixture(10, false);
        let space = SpaceId::new();
        let source = f
            .manager
            .create_source(text_source(space, "Budget", "budget"))
            .await
            .unwrap();

        f.manager.delete_source(source.id).unwrap();
        assert!(f.index.search(space, "budget", SearchScope::All, 0).unwrap().is_empty());
        assert!(matches!(
            f.manager.get_source(source.id),
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_space_cascades() {
        let f = fixture(10, false);
        let space = SpaceId::new();
        let other = SpaceId::new();
        f.manager.create_source(text_source(space, "a", "alpha")).await.unwrap();
        f.manager.create_source(text_source(space, "b", "beta")).await.unwrap();
        let kept = f
            .manager
            .create_source(text_source(other, "c", "gamma"))
            .await
            .unwrap();
        f.manager
            .store
            .insert_conversation(Conversation {
                id: ConversationId::new(),
                space_id: space,
                first_message: None,
                message_count: 0,
                created_at: Timestamp::now(),
                updated_at: Timestamp::now(),
            })
            .unwrap();

        let deletion = f.manager.delete_space(space).unwrap();
        assert_eq!(deletion.sources_removed, 2);
        assert_eq!(deletion.conversations_removed, 1);
        assert!(f.manager.list_sources(space).unwrap().is_empty());
        assert_eq!(f.index.stats(space).unwrap().ready_sources, 0);
        assert!(f.manager.get_source(kept.id).is_ok());
    }

    #[tokio::test]
    async fn test_summary_finishing_after_delete_does_not_reindex() {
        let f = fixture_with(
            config(10, 1_800, false),
            ScriptedCompletionGateway::replying(SUMMARY_REPLY).with_delay(Duration::from_millis(50)),
        );
        let space = SpaceId::new();
        let source = f
            .manager
            .create_source(text_source(space, "Budget", "we approved the budget"))
            .await
            .unwrap();

        let manager = f.manager.clone();
        let summary = tokio::spawn(async move { manager.summarize_source(source.id, None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.manager.delete_source(source.id).unwrap();

        let result = summary.await.unwrap();
        assert!(matches!(result, Err(SourceError::NotFound(_))));
        assert_eq!(f.index.stats(space).unwrap().ready_sources, 0);
        assert!(f.index.search(space, "budget", SearchScope::All, 0).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_summaries_and_deletes_leave_no_orphans() {
        let f = fixture_with(
            config(10, 1_800, false),
            ScriptedCompletionGateway::replying(SUMMARY_REPLY).with_delay(Duration::from_millis(2)),
        );
        let space = SpaceId::new();
        let mut handles = Vec::new();
        for i in 0..200 {
            let source = f
                .manager
                .create_source(text_source(space, &format!("note {}", i), "budget review"))
                .await
                .unwrap();
            let summarizer = f.manager.clone();
            handles.push(tokio::spawn(async move {
                let _ = summarizer.summarize_source(source.id, None).await;
            }));
            let deleter = f.manager.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                deleter.delete_source(source.id).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(f.manager.list_sources(space).unwrap().is_empty());
        assert_eq!(f.index.stats(space).unwrap().ready_sources, 0);
        assert!(f.index.search(space, "budget", SearchScope::All, 0).unwrap().is_empty());
    }
}
