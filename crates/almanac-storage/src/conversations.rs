//! Conversation records and their append-only message logs.

use almanac_core::error::{AlmanacError, Result};
use almanac_core::types::{Conversation, ConversationId, Message, MessageRole, SpaceId};

use crate::store::{read, write, ConversationRecord, RecordStore};

impl RecordStore {
    pub fn insert_conversation(&self, conversation: Conversation) -> Result<()> {
        let mut conversations = write(&self.conversations, "conversations")?;
        if conversations.contains_key(&conversation.id) {
            return Err(AlmanacError::Storage(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        conversations.insert(
            conversation.id,
            ConversationRecord {
                conversation,
                messages: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        let conversations = read(&self.conversations, "conversations")?;
        conversations
            .get(&id)
            .map(|r| r.conversation.clone())
            .ok_or_else(|| AlmanacError::not_found("conversation", id))
    }

    /// Conversations of a space, most recently active first.
    pub fn list_conversations(&self, space_id: SpaceId) -> Result<Vec<Conversation>> {
        let conversations = read(&self.conversations, "conversations")?;
        let mut result: Vec<Conversation> = conversations
            .values()
            .filter(|r| r.conversation.space_id == space_id)
            .map(|r| r.conversation.clone())
            .collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    /// Append a message and bump the conversation counters atomically.
    ///
    /// The first user message is cached on the conversation, truncated to
    /// `preview_chars` characters.
    pub fn append_message(&self, message: Message, preview_chars: usize) -> Result<Conversation> {
        let mut conversations = write(&self.conversations, "conversations")?;
        let record = conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| AlmanacError::not_found("conversation", message.conversation_id))?;

        if record.conversation.first_message.is_none() && message.role == MessageRole::User {
            record.conversation.first_message = Some(preview(&message.content, preview_chars));
        }
        record.conversation.message_count += 1;
        record.conversation.updated_at = message.created_at;
        record.messages.push(message);
        Ok(record.conversation.clone())
    }

    /// Messages of a conversation in append order.
    pub fn messages(&self, id: ConversationId) -> Result<Vec<Message>> {
        let conversations = read(&self.conversations, "conversations")?;
        conversations
            .get(&id)
            .map(|r| r.messages.clone())
            .ok_or_else(|| AlmanacError::not_found("conversation", id))
    }

    pub fn remove_conversation(&self, id: ConversationId) -> Result<Conversation> {
        let mut conversations = write(&self.conversations, "conversations")?;
        conversations
            .remove(&id)
            .map(|r| r.conversation)
            .ok_or_else(|| AlmanacError::not_found("conversation", id))
    }

    pub fn remove_space_conversations(&self, space_id: SpaceId) -> Result<Vec<ConversationId>> {
        let mut conversations = write(&self.conversations, "conversations")?;
        let ids: Vec<ConversationId> = conversations
            .values()
            .filter(|r| r.conversation.space_id == space_id)
            .map(|r| r.conversation.id)
            .collect();
        for id in &ids {
            conversations.remove(id);
        }
        Ok(ids)
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
