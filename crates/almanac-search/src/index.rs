//! Per-space index of ready sources.
//!
//! Entries are built outside the lock and swapped in whole, so readers
//! see a source either absent or fully consistent.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use almanac_core::config::SearchConfig;
use almanac_core::error::{AlmanacError, Result};
use almanac_core::types::{Source, SourceId, SourceType, SpaceId, Timestamp};

use crate::excerpt::highlighted_excerpts;
use crate::scoring::{LexicalScorer, Scorer};
use crate::text::{FoldedText, QueryTerms};

/// Which surfaces of a source a search looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    All,
    /// Source content only.
    Transcripts,
    Summaries,
}

impl SearchScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "transcripts" => Some(Self::Transcripts),
            "summaries" => Some(Self::Summaries),
            _ => None,
        }
    }

    fn includes(&self, surface: SearchSurface) -> bool {
        match self {
            Self::All => true,
            Self::Transcripts => surface == SearchSurface::Content,
            Self::Summaries => surface == SearchSurface::Summary,
        }
    }
}

/// The text of a source a result was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSurface {
    Content,
    Summary,
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "sourceId")]
    pub source_id: SourceId,
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Highlighted excerpts joined by newlines.
    #[serde(rename = "texte")]
    pub text: String,
    pub excerpts: Vec<String>,
    pub score: f64,
    pub surface: SearchSurface,
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt")]
    pub updated_at: Timestamp,
}

/// Aggregate counts for a space dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub ready_sources: usize,
    pub with_transcript: usize,
    pub with_summary: usize,
    pub total_words: usize,
}

/// Searchable snapshot of a ready source.
#[derive(Debug, Clone)]
pub struct IndexedSource {
    pub source_id: SourceId,
    pub space_id: SpaceId,
    pub name: String,
    pub source_type: SourceType,
    pub content: FoldedText,
    pub summary: Option<FoldedText>,
    pub has_transcript: bool,
    pub word_count: usize,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl IndexedSource {
    /// Snapshot a source; `None` when it is not ready.
    pub fn from_source(source: &Source) -> Option<Self> {
        let content = source.content.as_deref()?;
        Some(Self {
            source_id: source.id,
            space_id: source.space_id,
            name: source.name.clone(),
            source_type: source.source_type,
            content: FoldedText::new(content),
            summary: source.summary.as_deref().map(FoldedText::new),
            has_transcript: source.has_transcript(),
            word_count: source.word_count(),
            created_at: source.created_at,
            updated_at: source.updated_at,
        })
    }

    fn surface(&self, surface: SearchSurface) -> Option<&FoldedText> {
        match surface {
            SearchSurface::Content => Some(&self.content),
            SearchSurface::Summary => self.summary.as_ref(),
        }
    }
}

/// Ordering shared by search and retrieval: score desc, then most
/// recently updated, then source id.
pub fn rank_order(a: (f64, Timestamp, SourceId), b: (f64, Timestamp, SourceId)) -> Ordering {
    b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2))
}

type SpaceEntries = BTreeMap<SourceId, Arc<IndexedSource>>;

/// In-memory content index answering ranked, excerpted queries per space.
pub struct ContentIndex {
    config: SearchConfig,
    scorer: Arc<dyn Scorer>,
    spaces: RwLock<HashMap<SpaceId, SpaceEntries>>,
}

impl ContentIndex {
    pub fn new(config: SearchConfig) -> Self {
        Self::with_scorer(config, Arc::new(LexicalScorer))
    }

    pub fn with_scorer(config: SearchConfig, scorer: Arc<dyn Scorer>) -> Self {
        Self {
            config,
            scorer,
            spaces: RwLock::new(HashMap::new()),
        }
    }

    pub fn scorer(&self) -> Arc<dyn Scorer> {
        Arc::clone(&self.scorer)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<SpaceId, SpaceEntries>>> {
        self.spaces
            .read()
            .map_err(|e| AlmanacError::Storage(format!("content index lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<SpaceId, SpaceEntries>>> {
        self.spaces
            .write()
            .map_err(|e| AlmanacError::Storage(format!("content index lock poisoned: {}", e)))
    }

    /// Index the current state of a source.
    ///
    /// A source that is not ready is removed instead. Returns whether the
    /// source is indexed afterwards.
    pub fn upsert(&self, source: &Source) -> Result<bool> {
        let Some(entry) = IndexedSource::from_source(source) else {
            self.remove(source.space_id, source.id)?;
            return Ok(false);
        };
        let entry = Arc::new(entry);
        self.write()?
            .entry(source.space_id)
            .or_default()
            .insert(source.id, entry);
        debug!(source_id = %source.id, space_id = %source.space_id, "Source indexed");
        Ok(true)
    }

    pub fn remove(&self, space_id: SpaceId, source_id: SourceId) -> Result<bool> {
        let mut spaces = self.write()?;
        let removed = spaces
            .get_mut(&space_id)
            .is_some_and(|entries| entries.remove(&source_id).is_some());
        if spaces.get(&space_id).is_some_and(BTreeMap::is_empty) {
            spaces.remove(&space_id);
        }
        Ok(removed)
    }

    pub fn remove_space(&self, space_id: SpaceId) -> Result<usize> {
        Ok(self
            .write()?
            .remove(&space_id)
            .map(|entries| entries.len())
            .unwrap_or(0))
    }

    /// Consistent snapshot of the ready sources of a space.
    pub fn entries(&self, space_id: SpaceId) -> Result<Vec<Arc<IndexedSource>>> {
        Ok(self
            .read()?
            .get(&space_id)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Ranked, excerpted search over the ready sources of a space.
    ///
    /// Queries shorter than `min_query_chars` yield no results. A `limit`
    /// of zero means the configured default; larger limits are clamped.
    pub fn search(
        &self,
        space_id: SpaceId,
        query: &str,
        scope: SearchScope,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.chars().count() < self.config.min_query_chars {
            return Ok(Vec::new());
        }
        let terms = QueryTerms::parse(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let limit = match limit {
            0 => self.config.default_limit,
            n => n,
        }
        .min(self.config.max_limit);

        let mut results = Vec::new();
        for entry in self.entries(space_id)? {
            for surface in [SearchSurface::Content, SearchSurface::Summary] {
                if !scope.includes(surface) {
                    continue;
                }
                let Some(text) = entry.surface(surface) else {
                    continue;
                };
                let occurrences = text.find(&terms);
                let score = self.scorer.score(text, &terms, &occurrences);
                if score <= 0.0 {
                    continue;
                }
                let excerpts = highlighted_excerpts(
                    text,
                    &occurrences,
                    self.config.excerpt_radius,
                    self.config.max_excerpts,
                );
                results.push(SearchResult {
                    source_id: entry.source_id,
                    name: entry.name.clone(),
                    source_type: entry.source_type,
                    text: excerpts.join("\n"),
                    excerpts,
                    score,
                    surface,
                    created_at: entry.created_at,
                    updated_at: entry.updated_at,
                });
            }
        }

        results.sort_by(|a, b| {
            rank_order(
                (a.score, a.updated_at, a.source_id),
                (b.score, b.updated_at, b.source_id),
            )
            .then(a.surface.cmp(&b.surface))
        });
        results.truncate(limit);
        debug!(space_id = %space_id, results = results.len(), "Search completed");
        Ok(results)
    }

    /// Aggregate counts over the ready sources of a space.
    pub fn stats(&self, space_id: SpaceId) -> Result<SearchStats> {
        let spaces = self.read()?;
        let Some(entries) = spaces.get(&space_id) else {
            return Ok(SearchStats::default());
        };
        Ok(entries.values().fold(SearchStats::default(), |mut stats, e| {
            stats.ready_sources += 1;
            stats.with_transcript += usize::from(e.has_transcript);
            stats.with_summary += usize::from(e.summary.is_some());
            stats.total_words += e.word_count;
            stats
        }))
    }
}
