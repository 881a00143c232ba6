//! Case- and accent-insensitive text matching.
//!
//! Folding maps every char to exactly one char, so positions in the
//! folded text are positions in the original text.

/// Terms shorter than this are ignored.
const MIN_TERM_CHARS: usize = 2;

/// Dropped from queries unless nothing else is left.
const STOPWORDS: &[&str] = &[
    // English
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "we", "were", "what",
    "when", "where", "which", "who", "why", "with",
    // French
    "au", "aux", "ce", "ces", "dans", "de", "des", "du", "en", "est", "et", "la", "le", "les",
    "on", "ou", "par", "pour", "quel", "quelle", "qui", "que", "quoi", "sur", "un", "une",
];

pub(crate) fn fold_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    let c = match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => c,
    };
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Normalized search terms of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerms {
    terms: Vec<Vec<char>>,
}

impl QueryTerms {
    /// Split a query into folded, de-duplicated terms.
    ///
    /// Stopwords are dropped when at least one other term remains, so a
    /// query made only of stopwords still matches something.
    pub fn parse(query: &str) -> Self {
        let folded: String = query.chars().map(fold_char).collect();
        let mut all: Vec<Vec<char>> = Vec::new();
        for word in folded.split(|c: char| !is_word_char(c)) {
            let chars: Vec<char> = word.chars().collect();
            if chars.len() >= MIN_TERM_CHARS && !all.contains(&chars) {
                all.push(chars);
            }
        }

        let meaningful: Vec<Vec<char>> = all
            .iter()
            .filter(|t| {
                let term: String = t.iter().collect();
                !STOPWORDS.contains(&term.as_str())
            })
            .cloned()
            .collect();

        Self {
            terms: if meaningful.is_empty() { all } else { meaningful },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.iter().collect()).collect()
    }
}

/// A matched word, in char positions of the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start: usize,
    pub end: usize,
    /// Index of the query term that matched.
    pub term: usize,
}

/// A text prepared for repeated matching.
#[derive(Debug, Clone)]
pub struct FoldedText {
    original: String,
    folded: Vec<char>,
    /// Byte offset of each char, followed by the total byte length.
    offsets: Vec<usize>,
    word_count: usize,
}

impl FoldedText {
    pub fn new(text: &str) -> Self {
        let mut folded = Vec::with_capacity(text.len());
        let mut offsets = Vec::with_capacity(text.len() + 1);
        let mut word_count = 0;
        let mut prev_word = false;
        for (i, c) in text.char_indices() {
            let f = fold_char(c);
            let word = is_word_char(f);
            if word && !prev_word {
                word_count += 1;
            }
            prev_word = word;
            folded.push(f);
            offsets.push(i);
        }
        offsets.push(text.len());
        Self {
            original: text.to_string(),
            folded,
            offsets,
            word_count,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn char_len(&self) -> usize {
        self.folded.len()
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Original text between two char positions.
    pub fn slice(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.folded.len());
        let start = start.min(end);
        &self.original[self.offsets[start]..self.offsets[end]]
    }

    pub(crate) fn char_at(&self, i: usize) -> Option<char> {
        self.folded.get(i).copied()
    }

    pub(crate) fn is_word_at(&self, i: usize) -> bool {
        self.char_at(i).is_some_and(is_word_char)
    }

    /// Every word starting with one of the query terms, in text order.
    ///
    /// Matching is by word prefix: `budget` finds `budget` and `budgets`
    /// but not `rebudget`. Search scoring and highlighting both go through
    /// here, so a highlighted span is always what was scored.
    ///
    /// A word matching several terms is reported once, for the longest
    /// matching term. The occurrence spans the whole word so highlighting
    /// covers what was matched.
    pub fn find(&self, query: &QueryTerms) -> Vec<Occurrence> {
        let mut found = Vec::new();
        let n = self.folded.len();
        for start in 0..n {
            if !self.is_word_at(start) || (start > 0 && self.is_word_at(start - 1)) {
                continue;
            }
            let best = query
                .terms
                .iter()
                .enumerate()
                .filter(|(_, term)| self.folded[start..].starts_with(term))
                .max_by_key(|(_, term)| term.len());
            if let Some((term, _)) = best {
                let mut end = start;
                while end < n && self.is_word_at(end) {
                    end += 1;
                }
                found.push(Occurrence { start, end, term });
            }
        }
        found
    }
}
