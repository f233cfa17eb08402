//! Lexical scorer
//!
//! Scores a knowledge entry against a query token set using weighted field
//! matches: question-title hits weigh 4 per matched character, keyword hits
//! 3, and answer-body hits 1 per occurrence (capped at 5 occurrences).
//! The dominant field becomes the match type; ties resolve
//! question > keyword > answer.

use std::collections::HashSet;

use super::entry::{KnowledgeEntry, MatchType};

/// Occurrence cap for answer-body matches
const ANSWER_OCCURRENCE_CAP: usize = 5;

/// Result of scoring one entry against a token set
#[derive(Debug, Clone)]
pub struct LexicalScore {
    /// Sum of all field accumulators
    pub total: u32,
    /// Field with the largest accumulator
    pub match_type: MatchType,
    /// Tokens that contributed to any accumulator
    pub matched_tokens: Vec<String>,
}

impl LexicalScore {
    fn none() -> Self {
        Self {
            total: 0,
            match_type: MatchType::None,
            matched_tokens: Vec::new(),
        }
    }
}

/// Whether `needle` appears in `haystack` as an in-order character
/// subsequence. Used for ideographic keyword abbreviations, where 建課
/// stands for 建立課程 and exact containment never fires.
fn is_char_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.chars();
    needle.chars().all(|n| chars.any(|h| h == n))
}

/// Whether a keyword matches a token
///
/// Exact containment either way, or an ordered subsequence for ideographic
/// abbreviations (both sides length >= 2).
fn keyword_matches(keyword: &str, token: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    if keyword.contains(token) || token.contains(keyword) {
        return true;
    }
    keyword.chars().count() >= 2
        && token.chars().count() > keyword.chars().count()
        && is_char_subsequence(keyword, token)
}

/// Count non-overlapping occurrences of `token` in `text`
fn count_occurrences(text: &str, token: &str) -> usize {
    if token.is_empty() {
        return 0;
    }
    text.match_indices(token).count()
}

/// Score one knowledge entry against a query token set
pub fn score_entry(tokens: &HashSet<String>, entry: &KnowledgeEntry) -> LexicalScore {
    let question = entry.question.to_lowercase();
    let answer = entry.answer.to_lowercase();
    let keywords: Vec<String> = entry.keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut question_score = 0u32;
    let mut keyword_score = 0u32;
    let mut answer_score = 0u32;
    let mut matched_tokens = Vec::new();

    for token in tokens {
        let len = token.chars().count() as u32;
        if len < 2 {
            continue;
        }

        let mut matched = false;

        if question.contains(token.as_str()) {
            question_score += len * 4;
            matched = true;
        }

        if keywords.iter().any(|kw| keyword_matches(kw, token)) {
            keyword_score += len * 3;
            matched = true;
        }

        let occurrences = count_occurrences(&answer, token);
        if occurrences > 0 {
            answer_score += len * occurrences.min(ANSWER_OCCURRENCE_CAP) as u32;
            matched = true;
        }

        if matched {
            matched_tokens.push(token.clone());
        }
    }

    let total = question_score + keyword_score + answer_score;
    if total == 0 {
        return LexicalScore::none();
    }

    // Tie priority: question > keyword > answer
    let match_type = if question_score >= keyword_score && question_score >= answer_score {
        MatchType::Question
    } else if keyword_score >= answer_score {
        MatchType::Keyword
    } else {
        MatchType::Answer
    };

    matched_tokens.sort();
    LexicalScore {
        total,
        match_type,
        matched_tokens,
    }
}
