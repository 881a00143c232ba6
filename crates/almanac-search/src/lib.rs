//! Almanac Search crate - lexical scoring, excerpts and the per-space content index.
//!
//! The scoring primitive is shared with retrieval for grounded chat, so
//! search ranking and chat context selection always agree.

pub mod excerpt;
pub mod index;
pub mod scoring;
pub mod text;

pub use excerpt::{best_window, highlighted_excerpts};
pub use index::{
    rank_order, ContentIndex, IndexedSource, SearchResult, SearchScope, SearchStats, SearchSurface,
};
pub use scoring::{LexicalScorer, Scorer};
pub use text::{FoldedText, Occurrence, QueryTerms};
