//! Token-budgeted retrieval of source excerpts for grounded replies.
//!
//! Sources are ranked with the index's scorer and the same tie-break as
//! search, then packed into the budget best first: whole content when it
//! fits, otherwise the densest window that does. Tokens are approximated
//! from a fixed characters-per-token ratio.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use almanac_core::config::RetrievalConfig;
use almanac_core::types::{SourceReference, SpaceId};
use almanac_search::{
    best_window, rank_order, ContentIndex, FoldedText, IndexedSource, Occurrence, QueryTerms,
};

use crate::error::ChatError;

/// Prompt block emitted when no source clears the relevance floor.
pub const NO_RELEVANT_SOURCE: &str =
    "[no relevant source found] None of the sources in this space match the question.";

/// Approximate token count of a text.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.chars().count().div_ceil(chars_per_token.max(1))
}

/// Excerpts selected for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalContext {
    /// Cited excerpts, best first.
    pub excerpts: Vec<SourceReference>,
    /// Numbered excerpts ready to embed in a prompt.
    pub prompt_block: String,
    /// Estimated tokens of all excerpts; never above the requested budget.
    pub tokens_used: usize,
}

impl RetrievalContext {
    fn empty() -> Self {
        Self {
            excerpts: Vec::new(),
            prompt_block: NO_RELEVANT_SOURCE.to_string(),
            tokens_used: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.excerpts.is_empty()
    }
}

struct Candidate<'a> {
    entry: &'a IndexedSource,
    text: &'a FoldedText,
    occurrences: Vec<Occurrence>,
    score: f64,
}

/// Builds the cited context of a reply from the ready sources of a space.
pub struct RetrievalContextBuilder {
    index: Arc<ContentIndex>,
    config: RetrievalConfig,
}

impl RetrievalContextBuilder {
    pub fn new(index: Arc<ContentIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Select excerpts relevant to `query` within `token_budget` tokens.
    ///
    /// A source is scored on its content and its summary; the better
    /// surface supplies the excerpt. Identical inputs over an unchanged
    /// set of sources give identical output.
    pub fn build_context(
        &self,
        space_id: SpaceId,
        query: &str,
        token_budget: usize,
    ) -> Result<RetrievalContext, ChatError> {
        let terms = QueryTerms::parse(query);
        if terms.is_empty() || token_budget == 0 {
            return Ok(RetrievalContext::empty());
        }

        let entries = self.index.entries(space_id)?;
        let scorer = self.index.scorer();
        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        for entry in &entries {
            let surfaces = std::iter::once(&entry.content).chain(entry.summary.as_ref());
            let best = surfaces
                .map(|text| {
                    let occurrences = text.find(&terms);
                    let score = scorer.score(text, &terms, &occurrences);
                    (text, occurrences, score)
                })
                .reduce(|best, next| if next.2 > best.2 { next } else { best });
            if let Some((text, occurrences, score)) = best {
                if score > self.config.relevance_floor {
                    candidates.push(Candidate {
                        entry,
                        text,
                        occurrences,
                        score,
                    });
                }
            }
        }
        candidates.sort_by(|a, b| {
            rank_order(
                (a.score, a.entry.updated_at, a.entry.source_id),
                (b.score, b.entry.updated_at, b.entry.source_id),
            )
        });
        candidates.truncate(self.config.max_sources);

        let chars_per_token = self.config.chars_per_token.max(1);
        let mut remaining = token_budget;
        let mut excerpts = Vec::new();
        for candidate in &candidates {
            if remaining == 0
                || (!excerpts.is_empty() && remaining < self.config.min_excerpt_tokens)
            {
                break;
            }
            let excerpt = best_window(
                candidate.text,
                &candidate.occurrences,
                remaining * chars_per_token,
            );
            if excerpt.is_empty() {
                continue;
            }
            remaining -= estimate_tokens(excerpt, chars_per_token).min(remaining);
            excerpts.push(SourceReference {
                source_id: candidate.entry.source_id,
                name: candidate.entry.name.clone(),
                source_type: candidate.entry.source_type,
                excerpt: excerpt.to_string(),
            });
        }

        if excerpts.is_empty() {
            debug!(space_id = %space_id, "No relevant source for query");
            return Ok(RetrievalContext::empty());
        }

        let tokens_used = token_budget - remaining;
        debug!(
            space_id = %space_id,
            sources = excerpts.len(),
            tokens_used,
            token_budget,
            "Retrieval context built"
        );
        Ok(RetrievalContext {
            prompt_block: render_block(&excerpts),
            excerpts,
            tokens_used,
        })
    }
}

fn render_block(excerpts: &[SourceReference]) -> String {
    excerpts
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {} ({})\n{}", i + 1, r.name, r.source_type, r.excerpt))
        .collect::<Vec<_>>()
        .join("\n\n")
}
