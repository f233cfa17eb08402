//! Lexical tokenizer
//!
//! Turns free text into a deduplicated set of matchable tokens. Words are
//! lower-cased, punctuation-stripped and whitespace-split; stop words
//! (interrogative particles, courtesy words) are discarded. Words containing
//! CJK ideographs additionally emit every contiguous substring of length
//! 2, 3 and 4, since ideographic text carries no whitespace boundaries.
//!
//! Pure and deterministic; single-character tokens are emitted but ignored
//! downstream by the scorer.

use std::collections::HashSet;

/// Interrogative particles and courtesy words that carry no matchable content
const STOP_WORDS: &[&str] = &[
    // Interrogatives
    "嗎", "呢", "吧", "啊", "呀", "喔", "哦", "怎麼", "怎樣", "如何", "什麼", "甚麼", "哪裡",
    "哪個", "為何", "為什麼", "是否", "能否", "可否", "請問", "想問", "想請問",
    // Courtesy
    "請", "謝謝", "感謝", "麻煩", "不好意思", "您好", "你好", "大家好",
    // Latin-script function words
    "the", "a", "an", "is", "are", "was", "were", "do", "does", "did", "can", "could", "will",
    "would", "should", "what", "how", "why", "when", "where", "who", "please", "thanks", "hi",
    "hello", "to", "of", "in", "on", "for", "and", "or",
];

/// Whether a character is a CJK ideograph
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'        // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}'      // Extension A
        | '\u{F900}'..='\u{FAFF}'      // Compatibility Ideographs
    )
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Tokenize free text into a set of matchable tokens
///
/// Output order is irrelevant; tokens are deduplicated.
pub fn tokenize(text: &str) -> HashSet<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || is_cjk(c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut tokens = HashSet::new();

    for word in normalized.split_whitespace() {
        if is_stop_word(word) {
            continue;
        }

        tokens.insert(word.to_string());

        if word.chars().any(is_cjk) {
            let chars: Vec<char> = word.chars().collect();
            for window in 2..=4usize {
                if chars.len() < window {
                    break;
                }
                for start in 0..=(chars.len() - window) {
                    let gram: String = chars[start..start + window].iter().collect();
                    if !is_stop_word(&gram) {
                        tokens.insert(gram);
                    }
                }
            }
        }
    }

    tokens
}
