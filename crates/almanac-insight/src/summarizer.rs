//! Summarization service for generating structured summaries of source content.

use std::sync::Arc;

use almanac_core::config::SummarizationConfig;
use almanac_core::types::SummaryConfig;
use almanac_gateway::{with_timeout, CompletionGateway};
use tracing::debug;

use crate::error::InsightError;
use crate::extract::{extract_json_object, ExtractMode};
use crate::prompt::build_summary_prompt;
use crate::types::StructuredSummary;

/// A summary ready to be stored on a source.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSummary {
    /// Rendered summary text.
    pub text: String,
    pub structured: StructuredSummary,
    pub tokens_used: u32,
}

/// Generates summaries through a [`CompletionGateway`].
///
/// Every failure, including a reply that cannot be parsed, is returned as
/// an error so callers never store a partial summary.
pub struct SummarizationService {
    gateway: Arc<dyn CompletionGateway>,
    config: SummarizationConfig,
}

impl SummarizationService {
    pub fn new(gateway: Arc<dyn CompletionGateway>, config: SummarizationConfig) -> Self {
        Self { gateway, config }
    }

    fn mode(&self) -> ExtractMode {
        if self.config.strict_json {
            ExtractMode::Strict
        } else {
            ExtractMode::Lenient
        }
    }

    /// Summarize `content` with the given configuration snapshot.
    pub async fn summarize(
        &self,
        content: &str,
        config: &SummaryConfig,
    ) -> Result<GeneratedSummary, InsightError> {
        if content.trim().is_empty() {
            return Err(InsightError::EmptyContent);
        }

        let prompt = build_summary_prompt(content, config);
        let completion = with_timeout(
            self.config.request_timeout(),
            self.gateway.complete(&prompt, self.config.max_tokens),
        )
        .await?;

        let object = extract_json_object(&completion.text, self.mode())?;
        let structured = StructuredSummary::from_object(&object);
        if !structured.has_content(config) {
            return Err(InsightError::EmptySummary);
        }

        let text = structured.render(config);
        debug!(
            tokens_used = completion.tokens_used,
            summary_chars = text.len(),
            "Summary generated"
        );
        Ok(GeneratedSummary {
            text,
            structured,
            tokens_used: completion.tokens_used,
        })
    }
}
