//! End-to-end behaviour across the lifecycle manager, the content index
//! and the conversation orchestrator, driven by scripted gateways.

use std::sync::Arc;
use std::time::Duration;

use almanac_chat::{cites_only, ConversationOrchestrator};
use almanac_core::types::{
    MessageRole, Source, SourceId, SourceType, SpaceId, SummaryConfig, TranscriptionStatus,
};
use almanac_core::{AlmanacConfig, DomainEvent};
use almanac_gateway::{
    AudioRef, ScriptedCompletionGateway, ScriptedTranscriptionGateway, TranscriptPayload,
};
use almanac_search::{ContentIndex, SearchScope};
use almanac_sources::{NewSource, NewSummaryModel, SourceLifecycleManager, SourcePayload};
use almanac_storage::RecordStore;

const SUMMARY_REPLY: &str = "Here is the summary you asked for:\n\
    {\"keyPoints\": [\"Greeting\"], \"decisions\": [], \"actionItems\": [], \"questions\": [], \"sentiment\": \"positive\"}\n\
    Let me know if you need more.";

struct Harness {
    manager: SourceLifecycleManager,
    orchestrator: Arc<ConversationOrchestrator>,
    index: Arc<ContentIndex>,
    transcriber: Arc<ScriptedTranscriptionGateway>,
    completer: Arc<ScriptedCompletionGateway>,
}

fn harness_with(config: AlmanacConfig, completer: ScriptedCompletionGateway) -> Harness {
    let store = Arc::new(RecordStore::new());
    let index = Arc::new(ContentIndex::new(config.search.clone()));
    let transcriber = Arc::new(ScriptedTranscriptionGateway::new());
    let completer = Arc::new(completer);
    let manager = SourceLifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&index),
        transcriber.clone(),
        completer.clone(),
        &config,
    );
    let orchestrator = Arc::new(
        ConversationOrchestrator::new(store, Arc::clone(&index), completer.clone(), &config)
            .with_events(manager.event_sender()),
    );
    Harness {
        manager,
        orchestrator,
        index,
        transcriber,
        completer,
    }
}

fn config(job_timeout_secs: u64, auto_summarize: bool) -> AlmanacConfig {
    let mut config = AlmanacConfig::default();
    config.transcription.poll_interval_ms = 10;
    config.transcription.job_timeout_secs = job_timeout_secs;
    config.transcription.request_timeout_secs = 1;
    config.summarization.auto_summarize = auto_summarize;
    config.summarization.request_timeout_secs = 1;
    config.chat.request_timeout_secs = 1;
    config
}

fn text(space_id: SpaceId, name: &str, content: &str) -> NewSource {
    NewSource {
        space_id,
        name: name.to_string(),
        source_type: SourceType::Text,
        payload: SourcePayload::Text(content.to_string()),
    }
}

fn recording(space_id: SpaceId) -> NewSource {
    NewSource {
        space_id,
        name: "Weekly sync".to_string(),
        source_type: SourceType::Meeting,
        payload: SourcePayload::Audio(AudioRef {
            file_key: "uploads/sync.webm".to_string(),
            mime: "audio/webm".to_string(),
            size: 4096,
        }),
    }
}

fn transcript(text: &str) -> TranscriptPayload {
    TranscriptPayload {
        text: text.to_string(),
        segments: vec![],
        speakers: vec!["Ana".to_string()],
        duration_seconds: Some(2.0),
        confidence: Some(0.95),
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

#[tokio::test]
async fn budget_source_is_found_and_highlighted() {
    let h = harness_with(config(1_800, false), ScriptedCompletionGateway::replying("ok"));
    let space = SpaceId::new();
    let source = h
        .manager
        .create_source(text(space, "Budget Q1", "we approved the budget increase"))
        .await
        .unwrap();
    assert_eq!(source.transcription_status, TranscriptionStatus::None);
    assert!(source.content.is_some());

    let results = h.index.search(space, "budget", SearchScope::All, 0).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source_id, source.id);
    assert!(results[0].text.contains("<mark>budget</mark>"));
    assert!(results[0].score > 0.0);

    assert!(h.index.search(space, "b", SearchScope::All, 0).unwrap().is_empty());
    assert!(h.index.search(space, " ", SearchScope::All, 0).unwrap().is_empty());
}

#[tokio::test]
async fn recording_is_transcribed_then_summarized_with_default_model() {
    let h = harness_with(config(1_800, true), ScriptedCompletionGateway::replying(SUMMARY_REPLY));
    let space = SpaceId::new();
    let mut events = h.manager.subscribe();
    let model = h
        .manager
        .create_summary_model(NewSummaryModel {
            space_id: space,
            name: "Sync notes".to_string(),
            config: SummaryConfig::default(),
            is_default: true,
            is_shared: false,
        })
        .unwrap();

    let source = h.manager.create_source(recording(space)).await.unwrap();
    assert_eq!(source.transcription_status, TranscriptionStatus::Pending);

    // Not searchable while the transcript is outstanding.
    assert_eq!(h.index.stats(space).unwrap().ready_sources, 0);

    let job = wait_for(&h.manager, source.id, |s| s.transcription_job_id.is_some())
        .await
        .transcription_job_id
        .unwrap();
    h.transcriber.complete(&job, transcript("hello world"));

    let done = wait_for(&h.manager, source.id, |s| s.summary.is_some()).await;
    assert_eq!(done.transcription_status, TranscriptionStatus::Done);
    assert_eq!(done.content.as_deref(), Some("hello world"));
    assert_eq!(done.summary_model_ref.unwrap().model_id, Some(model.id));
    assert!(done.summary.unwrap().contains("Greeting"));

    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::TranscriptionStatusChanged { from, to, .. } = event {
            transitions.push((from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (TranscriptionStatus::None, TranscriptionStatus::Pending),
            (TranscriptionStatus::Pending, TranscriptionStatus::Processing),
            (TranscriptionStatus::Processing, TranscriptionStatus::Done),
        ]
    );

    let stats = h.index.stats(space).unwrap();
    assert_eq!(stats.ready_sources, 1);
    assert_eq!(stats.with_transcript, 1);
    assert_eq!(stats.with_summary, 1);
    assert_eq!(stats.total_words, 2);
}

#[tokio::test]
async fn silent_provider_times_out_without_summary() {
    let h = harness_with(config(0, true), ScriptedCompletionGateway::replying(SUMMARY_REPLY));
    let space = SpaceId::new();
    let source = h.manager.create_source(recording(space)).await.unwrap();

    let failed = wait_for(&h.manager, source.id, |s| {
        s.transcription_status == TranscriptionStatus::Error
    })
    .await;
    assert!(failed.content.is_none());
    assert!(failed.summary.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.completer.call_count(), 0);
    assert!(h.index.search(space, "hello", SearchScope::All, 0).unwrap().is_empty());
}

#[tokio::test]
async fn chat_cites_only_retrieved_sources() {
    let h = harness_with(
        config(1_800, false),
        ScriptedCompletionGateway::replying("The budget increase was approved [1]."),
    );
    let space = SpaceId::new();
    let budget = h
        .manager
        .create_source(text(space, "Budget Q1", "we approved the budget increase"))
        .await
        .unwrap();
    h.manager
        .create_source(text(space, "Offsite", "the offsite moves to June"))
        .await
        .unwrap();
    // Pending sources never feed the context.
    h.manager.create_source(recording(space)).await.unwrap();

    let conversation = h.orchestrator.create_conversation(space).unwrap();
    h.orchestrator
        .post_user_message(conversation.id, "was the budget approved?")
        .unwrap();
    let reply = h.orchestrator.generate_reply(conversation.id).await.unwrap();

    let retrieved = h
        .orchestrator
        .retrieval()
        .build_context(space, "was the budget approved?", 3_000)
        .unwrap();
    assert!(cites_only(&reply, &retrieved.excerpts));
    assert_eq!(reply.sources_used.len(), 1);
    assert_eq!(reply.sources_used[0].source_id, budget.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn message_count_tracks_user_messages_and_replies() {
    let h = harness_with(
        config(1_800, false),
        ScriptedCompletionGateway::replying("noted").with_delay(Duration::from_millis(20)),
    );
    let space = SpaceId::new();
    h.manager
        .create_source(text(space, "Budget Q1", "we approved the budget increase"))
        .await
        .unwrap();
    let conversation = h.orchestrator.create_conversation(space).unwrap();

    for turn in 0..3 {
        h.orchestrator
            .post_user_message(conversation.id, &format!("budget question {turn}"))
            .unwrap();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let orchestrator = Arc::clone(&h.orchestrator);
                let id = conversation.id;
                tokio::spawn(async move { orchestrator.generate_reply(id).await })
            })
            .collect();
        let mut ok = 0;
        for handle in handles {
            ok += usize::from(handle.await.unwrap().is_ok());
        }
        assert_eq!(ok, 1);
    }

    let conversation = h.orchestrator.get_conversation(conversation.id).unwrap();
    assert_eq!(conversation.message_count, 6);
    assert_eq!(conversation.first_message.as_deref(), Some("budget question 0"));
    let roles: Vec<MessageRole> = h
        .orchestrator
        .history(conversation.id)
        .unwrap()
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(
        roles,
        [MessageRole::User, MessageRole::Assistant].repeat(3)
    );
}

#[tokio::test]
async fn failed_generation_leaves_conversation_untouched() {
    let completer = ScriptedCompletionGateway::replying("second try works");
    completer.push_error(almanac_gateway::GatewayError::Unavailable("overloaded".to_string()));
    let h = harness_with(config(1_800, false), completer);
    let conversation = h.orchestrator.create_conversation(SpaceId::new()).unwrap();
    h.orchestrator.post_user_message(conversation.id, "hello?").unwrap();

    let err = h.orchestrator.generate_reply(conversation.id).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        h.orchestrator.get_conversation(conversation.id).unwrap().message_count,
        1
    );

    let reply = h.orchestrator.generate_reply(conversation.id).await.unwrap();
    assert_eq!(reply.content, "second try works");
    assert_eq!(
        h.orchestrator.get_conversation(conversation.id).unwrap().message_count,
        2
    );
}

#[tokio::test]
async fn deleting_a_space_removes_everything_it_owns() {
    let h = harness_with(config(1_800, false), ScriptedCompletionGateway::replying("ok"));
    let space = SpaceId::new();
    let other = SpaceId::new();
    h.manager.create_source(text(space, "a", "budget alpha")).await.unwrap();
    h.manager.create_source(text(other, "b", "budget beta")).await.unwrap();
    let conversation = h.orchestrator.create_conversation(space).unwrap();
    h.orchestrator.post_user_message(conversation.id, "budget?").unwrap();

    let deletion = h.manager.delete_space(space).unwrap();
    assert_eq!(deletion.sources_removed, 1);
    assert_eq!(deletion.conversations_removed, 1);

    assert!(h.index.search(space, "budget", SearchScope::All, 0).unwrap().is_empty());
    assert_eq!(h.index.search(other, "budget", SearchScope::All, 0).unwrap().len(), 1);
    assert!(h.orchestrator.list_conversations(space).unwrap().is_empty());
    assert!(h.orchestrator.history(conversation.id).is_err());
}
