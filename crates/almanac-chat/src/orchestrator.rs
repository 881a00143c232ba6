//! Conversation orchestrator: user turns, grounded replies and history.
//!
//! Conversations only grow. Replies on one conversation are serialized;
//! a reply is appended only after the completion succeeded, and cites
//! exactly the excerpts retrieved for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use almanac_core::config::ChatConfig;
use almanac_core::types::{
    Conversation, ConversationId, Message, MessageId, MessageRole, SourceReference, SpaceId,
    Timestamp,
};
use almanac_core::{AlmanacConfig, DomainEvent};
use almanac_gateway::{with_timeout, CompletionGateway};
use almanac_search::ContentIndex;
use almanac_storage::RecordStore;

use crate::error::ChatError;
use crate::prompt::build_reply_prompt;
use crate::retrieval::RetrievalContextBuilder;

type ReplyLock = Arc<tokio::sync::Mutex<()>>;

/// Coordinates retrieval, generation and the message log of conversations.
pub struct ConversationOrchestrator {
    store: Arc<RecordStore>,
    retrieval: RetrievalContextBuilder,
    completer: Arc<dyn CompletionGateway>,
    config: ChatConfig,
    events: Option<broadcast::Sender<DomainEvent>>,
    /// One reply at a time per conversation.
    reply_locks: Mutex<HashMap<ConversationId, ReplyLock>>,
}

impl ConversationOrchestrator {
    pub fn new(
        store: Arc<RecordStore>,
        index: Arc<ContentIndex>,
        completer: Arc<dyn CompletionGateway>,
        config: &AlmanacConfig,
    ) -> Self {
        Self {
            store,
            retrieval: RetrievalContextBuilder::new(index, config.retrieval.clone()),
            completer,
            config: config.chat.clone(),
            events: None,
            reply_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Publish `MessageAppended` events on a shared channel.
    pub fn with_events(mut self, events: broadcast::Sender<DomainEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn retrieval(&self) -> &RetrievalContextBuilder {
        &self.retrieval
    }

    /// Create an empty conversation in a space.
    pub fn create_conversation(&self, space_id: SpaceId) -> Result<Conversation, ChatError> {
        let now = Timestamp::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            space_id,
            first_message: None,
            message_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_conversation(conversation.clone())?;
        debug!(conversation_id = %conversation.id, space_id = %space_id, "Conversation created");
        Ok(conversation)
    }

    /// Append a user message. No retrieval happens here.
    pub fn post_user_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<Message, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_chars {
            return Err(ChatError::MessageTooLong(self.config.max_message_chars));
        }

        let message = Message {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::User,
            content: text.to_string(),
            sources_used: Vec::new(),
            tokens_used: None,
            created_at: Timestamp::now(),
        };
        self.append(message)
    }

    /// Generate and append the assistant reply to the latest user message.
    ///
    /// Concurrent calls on the same conversation run one after another; a
    /// call that finds the latest message already answered fails with
    /// [`ChatError::NoPendingUserMessage`]. On gateway failure or timeout
    /// nothing is appended and a retryable error is returned.
    pub async fn generate_reply(&self, conversation_id: ConversationId) -> Result<Message, ChatError> {
        let lock = self.reply_lock(conversation_id)?;
        let result = {
            let _guard = lock.lock().await;
            self.reply_to_latest(conversation_id).await
        };
        self.release_reply_lock(conversation_id, lock);
        result
    }

    async fn reply_to_latest(&self, conversation_id: ConversationId) -> Result<Message, ChatError> {
        let conversation = self.store.get_conversation(conversation_id)?;
        let mut messages = self.store.messages(conversation_id)?;
        let question = match messages.pop() {
            Some(last) if last.role == MessageRole::User => last,
            _ => return Err(ChatError::NoPendingUserMessage(conversation_id)),
        };
        let window = self.config.history_turns.saturating_mul(2);
        let window_start = messages.len().saturating_sub(window);
        let history = &messages[window_start..];

        let context = self.retrieval.build_context(
            conversation.space_id,
            &question.content,
            self.retrieval.config().token_budget,
        )?;
        let prompt = build_reply_prompt(&context, history, &question.content);

        let completion = with_timeout(
            self.config.request_timeout(),
            self.completer.complete(&prompt, self.config.max_reply_tokens),
        )
        .await
        .map_err(|e| {
            warn!(conversation_id = %conversation_id, error = %e, "Reply generation failed");
            ChatError::GenerationFailed(e.to_string())
        })?;

        let text = completion.text.trim();
        if text.is_empty() {
            warn!(conversation_id = %conversation_id, "Completion returned an empty reply");
            return Err(ChatError::GenerationFailed("empty reply".to_string()));
        }

        let reply = Message {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::Assistant,
            content: text.to_string(),
            sources_used: context.excerpts,
            tokens_used: Some(completion.tokens_used),
            created_at: Timestamp::now(),
        };
        let reply = self.append(reply)?;
        info!(
            conversation_id = %conversation_id,
            sources_used = reply.sources_used.len(),
            tokens_used = completion.tokens_used,
            "Reply generated"
        );
        Ok(reply)
    }

    /// Conversations of a space, most recently active first.
    pub fn list_conversations(&self, space_id: SpaceId) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.store.list_conversations(space_id)?)
    }

    pub fn get_conversation(&self, conversation_id: ConversationId) -> Result<Conversation, ChatError> {
        Ok(self.store.get_conversation(conversation_id)?)
    }

    /// Messages of a conversation in the order they were appended.
    pub fn history(&self, conversation_id: ConversationId) -> Result<Vec<Message>, ChatError> {
        Ok(self.store.messages(conversation_id)?)
    }

    /// Delete a conversation with all of its messages.
    pub fn delete_conversation(&self, conversation_id: ConversationId) -> Result<(), ChatError> {
        self.store.remove_conversation(conversation_id)?;
        if let Ok(mut locks) = self.reply_locks.lock() {
            locks.remove(&conversation_id);
        }
        info!(conversation_id = %conversation_id, "Conversation deleted");
        Ok(())
    }

    fn reply_lock(&self, conversation_id: ConversationId) -> Result<ReplyLock, ChatError> {
        let mut locks = self
            .reply_locks
            .lock()
            .map_err(|e| ChatError::StorageError(format!("reply lock map poisoned: {}", e)))?;
        Ok(Arc::clone(locks.entry(conversation_id).or_default()))
    }

    /// Drop the map entry once no other caller holds or awaits the lock.
    fn release_reply_lock(&self, conversation_id: ConversationId, lock: ReplyLock) {
        let Ok(mut locks) = self.reply_locks.lock() else {
            return;
        };
        // Clones are only taken under the map lock, so the count is stable here.
        let ptr = Arc::as_ptr(&lock);
        drop(lock);
        let idle = locks
            .get(&conversation_id)
            .is_some_and(|held| Arc::as_ptr(held) == ptr && Arc::strong_count(held) == 1);
        if idle {
            locks.remove(&conversation_id);
        }
    }

    fn append(&self, message: Message) -> Result<Message, ChatError> {
        self.store
            .append_message(message.clone(), self.config.first_message_preview_chars)?;
        if let Some(events) = &self.events {
            let _ = events.send(DomainEvent::MessageAppended {
                conversation_id: message.conversation_id,
                message_id: message.id,
                role: message.role,
                sources_used: message.sources_used.len(),
                timestamp: message.created_at,
            });
        }
        Ok(message)
    }
}

/// Whether every citation of a reply was part of the retrieved set.
pub fn cites_only(reply: &Message, retrieved: &[SourceReference]) -> bool {
    reply.sources_used.iter().all(|r| retrieved.contains(r))
}
