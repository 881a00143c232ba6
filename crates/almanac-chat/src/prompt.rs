//! Generation prompt for grounded replies.

use almanac_core::types::{Message, MessageRole};

use crate::retrieval::RetrievalContext;

const GROUNDED_INSTRUCTIONS: &str = "You answer questions about the sources of a knowledge space. \
Use only the numbered sources below. Refer to a source by its number in brackets, for example [1]. \
If the sources do not contain the answer, say so.";

const UNGROUNDED_INSTRUCTIONS: &str = "You answer questions about the sources of a knowledge space. \
No source in this space is relevant to the question. Say that the sources do not cover it \
and do not cite or invent any source.";

/// Assemble the prompt for the reply to `question`.
///
/// `history` holds the prior messages to replay, oldest first.
pub fn build_reply_prompt(context: &RetrievalContext, history: &[Message], question: &str) -> String {
    let mut prompt = String::new();
    if context.is_empty() {
        prompt.push_str(UNGROUNDED_INSTRUCTIONS);
    } else {
        prompt.push_str(GROUNDED_INSTRUCTIONS);
    }
    prompt.push_str("\n\nSources:\n");
    prompt.push_str(&context.prompt_block);

    if !history.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        for message in history {
            prompt.push_str(speaker(message.role));
            prompt.push_str(": ");
            prompt.push_str(message.content.trim());
            prompt.push('\n');
        }
    }

    prompt.push_str("\nUser: ");
    prompt.push_str(question.trim());
    prompt.push_str("\nAssistant:");
    prompt
}

fn speaker(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "User",
        MessageRole::Assistant => "Assistant",
    }
}
