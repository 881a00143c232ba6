//! Almanac Insight crate - structured summaries of source content.
//!
//! Provides:
//! - Summary prompt construction from an immutable `SummaryConfig`
//! - A structured extractor for JSON replies embedded in prose
//! - Rendering of the structured reply into the stored summary text
//! - `SummarizationService`, which ties the above to a `CompletionGateway`

pub mod error;
pub mod extract;
pub mod prompt;
pub mod summarizer;
pub mod types;

pub use error::InsightError;
pub use extract::{extract_json_object, ExtractMode};
pub use prompt::build_summary_prompt;
pub use summarizer::{GeneratedSummary, SummarizationService};
pub use types::StructuredSummary;
