//! Excerpt extraction and match highlighting.

use crate::text::{FoldedText, Occurrence};

pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";
/// Appended where an excerpt cuts the surrounding text.
pub const ELLIPSIS: &str = "…";

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_sentence_start(text: &FoldedText, p: usize) -> bool {
    let back = |n: usize| p.checked_sub(n).and_then(|i| text.char_at(i));
    match (back(2), back(1)) {
        (_, Some('\n')) => true,
        (Some(before), Some(gap)) => is_terminator(before) && gap.is_whitespace(),
        _ => false,
    }
}

/// Move a window start forward to a sentence start, or past a cut word.
fn snap_start(text: &FoldedText, start: usize, anchor: usize) -> usize {
    if start == 0 {
        return 0;
    }
    if let Some(p) = (start..=anchor).find(|p| is_sentence_start(text, *p)) {
        return p;
    }
    let mut p = start;
    if text.is_word_at(p) && text.is_word_at(p - 1) {
        while p < anchor && text.is_word_at(p) {
            p += 1;
        }
    }
    p
}

/// Move a window end back to a sentence end, or before a cut word.
fn snap_end(text: &FoldedText, end: usize, anchor: usize) -> usize {
    let len = text.char_len();
    if end >= len {
        return len;
    }
    let sentence_end = (anchor..end).rev().find(|t| {
        text.char_at(*t).is_some_and(is_terminator)
            && text.char_at(t + 1).map_or(true, char::is_whitespace)
    });
    if let Some(t) = sentence_end {
        return t + 1;
    }
    let mut e = end;
    if text.is_word_at(e) && text.is_word_at(e - 1) {
        while e > anchor && text.is_word_at(e - 1) {
            e -= 1;
        }
    }
    e
}

/// Display excerpts around the densest groups of matches.
///
/// Each excerpt keeps up to `radius` chars on both sides of a match, is
/// snapped to sentence or word boundaries when possible, has every match
/// inside it wrapped in `<mark>` tags and carries an ellipsis where it
/// cuts the text. At most `max_excerpts` non-overlapping excerpts are
/// returned, in text order.
pub fn highlighted_excerpts(
    text: &FoldedText,
    occurrences: &[Occurrence],
    radius: usize,
    max_excerpts: usize,
) -> Vec<String> {
    if occurrences.is_empty() || max_excerpts == 0 {
        return Vec::new();
    }
    let len = text.char_len();

    let mut windows: Vec<(usize, usize, usize)> = occurrences
        .iter()
        .map(|occ| {
            let start = occ.start.saturating_sub(radius);
            let end = (occ.end + radius).min(len);
            let density = occurrences
                .iter()
                .filter(|o| o.start >= start && o.end <= end)
                .count();
            (start, end, density)
        })
        .collect();
    windows.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

    let mut picked: Vec<(usize, usize)> = Vec::new();
    for (start, end, _) in windows {
        if picked.len() == max_excerpts {
            break;
        }
        if picked.iter().all(|(s, e)| end <= *s || *e <= start) {
            picked.push((start, end));
        }
    }
    picked.sort_unstable();

    picked
        .into_iter()
        .map(|(start, end)| {
            let inside: Vec<&Occurrence> = occurrences
                .iter()
                .filter(|o| o.start >= start && o.end <= end)
                .collect();
            let first = inside.first().map_or(start, |o| o.start);
            let last = inside.last().map_or(end, |o| o.end);
            let s = snap_start(text, start, first);
            let e = snap_end(text, end, last);
            render(text, s, e, &inside)
        })
        .collect()
}

fn render(text: &FoldedText, start: usize, end: usize, marks: &[&Occurrence]) -> String {
    let mut body = String::new();
    let mut cursor = start;
    for occ in marks {
        body.push_str(text.slice(cursor, occ.start));
        body.push_str(MARK_OPEN);
        body.push_str(text.slice(occ.start, occ.end));
        body.push_str(MARK_CLOSE);
        cursor = occ.end;
    }
    body.push_str(text.slice(cursor, end));
    let body = body.replace('\n', " ");

    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.push_str(body.trim());
    if end < text.char_len() {
        out.push_str(ELLIPSIS);
    }
    out
}

/// The contiguous span of at most `max_chars` chars holding the most matches.
///
/// Used for prompt context: no markup, no ellipsis. The whole text is
/// returned when it fits; without matches the span starts at the top.
pub fn best_window<'a>(text: &'a FoldedText, occurrences: &[Occurrence], max_chars: usize) -> &'a str {
    let len = text.char_len();
    if max_chars == 0 || len == 0 {
        return "";
    }
    if len <= max_chars {
        return text.as_str().trim();
    }

    let (span_start, span_end) = if occurrences.is_empty() {
        (0, 0)
    } else {
        let (mut best_i, mut best_j, mut best_count) = (0, 0, 0);
        let mut j = 0;
        for i in 0..occurrences.len() {
            j = j.max(i);
            while j + 1 < occurrences.len()
                && occurrences[j + 1].end - occurrences[i].start <= max_chars
            {
                j += 1;
            }
            if j - i + 1 > best_count {
                best_count = j - i + 1;
                best_i = i;
                best_j = j;
            }
        }
        let span_start = occurrences[best_i].start;
        let span_end = occurrences[best_j].end.min(span_start + max_chars);
        (span_start, span_end)
    };

    let slack = max_chars - (span_end - span_start);
    let mut start = span_start.saturating_sub(slack / 2).min(len - max_chars);
    let mut end = start + max_chars;

    if start > 0 && text.is_word_at(start) && text.is_word_at(start - 1) {
        while start < span_start && text.is_word_at(start) {
            start += 1;
        }
    }
    if end < len && text.is_word_at(end) && text.is_word_at(end - 1) {
        while end > span_end.max(start) && text.is_word_at(end - 1) {
            end -= 1;
        }
    }
    text.slice(start, end).trim()
}
