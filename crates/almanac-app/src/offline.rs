//! Extractive completion gateway for running without a model provider.
//!
//! Summary prompts get a JSON object built from the highest-ranked
//! sentences of the content. Reply prompts get the sentences of each
//! numbered source that best overlap the question, cited by number.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::json;

use almanac_chat::NO_RELEVANT_SOURCE;
use almanac_gateway::{Completion, CompletionGateway, GatewayError};
use almanac_insight::prompt::{CONTENT_END, CONTENT_START};

const KEY_POINTS: usize = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineCompletionGateway;

#[async_trait]
impl CompletionGateway for OfflineCompletionGateway {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion, GatewayError> {
        let text = match content_block(prompt) {
            Some(content) => summarize(content),
            None => answer(prompt),
        };
        let text: String = text.chars().take(max_tokens as usize * 4).collect();
        if text.trim().is_empty() {
            return Err(GatewayError::InvalidResponse("nothing to extract".to_string()));
        }
        let tokens_used = (text.chars().count() as u32).div_ceil(4);
        Ok(Completion { text, tokens_used })
    }
}

fn content_block(prompt: &str) -> Option<&str> {
    let start = prompt.find(CONTENT_START)? + CONTENT_START.len();
    let end = prompt[start..].find(CONTENT_END)? + start;
    Some(prompt[start..end].trim())
}

/// Split on `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let at_break = matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace());
        if at_break {
            sentences.push(text[start..=i].trim());
            start = i + 1;
        }
    }
    sentences.push(text[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn summarize(content: &str) -> String {
    let sentences = split_sentences(content);
    let mut ranked: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let all = words(s);
            let unique: HashSet<&String> = all.iter().collect();
            (i, unique.len() as f64 * (all.len() as f64).sqrt())
        })
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut top: Vec<usize> = ranked.iter().take(KEY_POINTS).map(|(i, _)| *i).collect();
    top.sort_unstable();

    let key_points: Vec<&str> = top.iter().map(|i| sentences[*i]).collect();
    let questions: Vec<&str> = sentences
        .iter()
        .copied()
        .filter(|s| s.ends_with('?'))
        .collect();
    json!({
        "keyPoints": key_points,
        "decisions": [],
        "actionItems": [],
        "questions": questions,
        "participants": [],
        "sentiment": "neutral",
    })
    .to_string()
}

/// Numbered sources of a reply prompt as `(number, name, excerpt)`.
fn sources(prompt: &str) -> Vec<(String, String, String)> {
    let Some(start) = prompt.find("Sources:\n") else {
        return Vec::new();
    };
    let block = &prompt[start + "Sources:\n".len()..];
    let end = block
        .find("\n\nConversation so far:")
        .or_else(|| block.rfind("\nUser: "))
        .unwrap_or(block.len());

    block[..end]
        .split("\n\n")
        .filter_map(|entry| {
            let (header, excerpt) = entry.split_once('\n')?;
            let (number, rest) = header.strip_prefix('[')?.split_once("] ")?;
            let name = rest.rsplit_once(" (").map_or(rest, |(name, _)| name);
            Some((number.to_string(), name.to_string(), excerpt.trim().to_string()))
        })
        .collect()
}

fn question(prompt: &str) -> &str {
    let start = prompt.rfind("\nUser: ").map_or(0, |i| i + "\nUser: ".len());
    let rest = &prompt[start..];
    rest.rfind("\nAssistant:").map_or(rest, |end| &rest[..end]).trim()
}

fn answer(prompt: &str) -> String {
    if prompt.contains(NO_RELEVANT_SOURCE) {
        return "None of the sources in this space cover that question.".to_string();
    }
    let asked: HashSet<String> = words(question(prompt)).into_iter().collect();

    sources(prompt)
        .into_iter()
        .filter_map(|(number, name, excerpt)| {
            let best = split_sentences(&excerpt)
                .into_iter()
                .enumerate()
                .max_by_key(|(i, s)| {
                    let overlap = words(s).iter().filter(|w| asked.contains(*w)).count();
                    (overlap, usize::MAX - i)
                })
                .map(|(_, s)| s.to_string())?;
            Some(format!("{} [{}]: {}", name, number, best))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
