//! Relevance scoring shared by search and retrieval.

use crate::text::{FoldedText, Occurrence, QueryTerms};

/// Scores a text against a query.
///
/// Implementations must be pure: the same text and query always give the
/// same score. A score of `0.0` means "not relevant".
pub trait Scorer: Send + Sync {
    fn score(&self, text: &FoldedText, query: &QueryTerms, occurrences: &[Occurrence]) -> f64;
}

/// Frequency-based lexical relevance.
///
/// The score is the density of matched words in the text, weighted by the
/// fraction of query terms that matched at least once. Every occurrence
/// counts, not only those shown in excerpts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl Scorer for LexicalScorer {
    fn score(&self, text: &FoldedText, query: &QueryTerms, occurrences: &[Occurrence]) -> f64 {
        if occurrences.is_empty() || query.is_empty() {
            return 0.0;
        }
        let words = text.word_count().max(1) as f64;
        let density = occurrences.len() as f64 / words;

        let mut matched = vec![false; query.len()];
        for occ in occurrences {
            if let Some(slot) = matched.get_mut(occ.term) {
                *slot = true;
            }
        }
        let coverage = matched.iter().filter(|m| **m).count() as f64 / query.len() as f64;

        density * coverage
    }
}
