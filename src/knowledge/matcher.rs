use super::normalize::{ normalize, tokenize };
use crate::models::knowledge::KnowledgeEntry;

const MIN_KEYWORD_MATCHES: usize = 2;
const KEYWORD_MATCH_RATIO: f64 = 0.6;

/// Minimum number of shared keywords for an entry with `keyword_count`
/// keywords. Never below two, so one-word questions only match by containment.
pub fn keyword_threshold(keyword_count: usize) -> usize {
    let scaled = ((keyword_count as f64) * KEYWORD_MATCH_RATIO).floor() as usize;
    MIN_KEYWORD_MATCHES.max(scaled)
}

/// Returns the answer of the first entry matching `question`, in entry order.
///
/// An entry matches when either normalized text contains the other, or when
/// enough of the entry's question keywords appear among the input tokens.
pub fn find_answer<'a>(question: &str, entries: &'a [KnowledgeEntry]) -> Option<&'a str> {
    let input = normalize(question);
    let input_tokens = tokenize(&input);

    for entry in entries {
        let candidate = normalize(&entry.question);
        if input.contains(candidate.as_str()) || candidate.contains(input.as_str()) {
            return Some(entry.answer.as_str());
        }

        let keywords = tokenize(&candidate);
        let matched = keywords
            .iter()
            .filter(|keyword| input_tokens.contains(*keyword))
            .count();
        if matched >= keyword_threshold(keywords.len()) {
            return Some(entry.answer.as_str());
        }
    }

    None
}
