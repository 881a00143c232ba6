//! Grounded conversations over the sources of a space.
//!
//! Retrieves token-budgeted excerpts with the same scoring as search,
//! builds the generation prompt and appends replies whose citations are
//! exactly the excerpts that were retrieved.

pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;

pub use error::ChatError;
pub use orchestrator::{cites_only, ConversationOrchestrator};
pub use prompt::build_reply_prompt;
pub use retrieval::{estimate_tokens, RetrievalContext, RetrievalContextBuilder, NO_RELEVANT_SOURCE};
