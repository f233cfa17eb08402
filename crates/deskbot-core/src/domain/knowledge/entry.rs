//! Knowledge entry types
//!
//! Entries are owned by the knowledge-base administration subsystem; this
//! engine reads them and writes back usage statistics as a side effect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A curated question/answer pair in the knowledge base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Opaque identifier assigned by the knowledge store
    pub id: i64,
    /// Title text the entry answers
    pub question: String,
    /// Body text of the answer
    pub answer: String,
    /// Optional category used for per-group allow-list filtering
    pub category: Option<String>,
    /// Keywords associated with the entry (order irrelevant)
    pub keywords: Vec<String>,
    /// Precomputed embedding, if the entry has been indexed
    pub embedding: Option<Vec<f32>>,
    /// Soft-delete flag; inactive entries are never retrieved
    pub is_active: bool,
    /// Monotonic counter of how often the entry was used in a reply
    pub usage_count: i64,
    /// When the entry was last used in a reply
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Create a new entry with the given question and answer
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            question: question.into(),
            answer: answer.into(),
            category: None,
            keywords: Vec::new(),
            embedding: None,
            is_active: true,
            usage_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the keywords
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Set the embedding vector
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Which field of an entry a lexical match came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Question,
    Keyword,
    Answer,
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Question => "question",
            MatchType::Keyword => "keyword",
            MatchType::Answer => "answer",
            MatchType::None => "none",
        }
    }
}

/// A transient, per-query retrieval result
///
/// Never persisted; the relevance score is normalized to 0-100 regardless
/// of which retrieval path produced it.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub entry: KnowledgeEntry,
    /// Normalized relevance, 0-100
    pub relevance: u8,
}

/// Per-conversation reply settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub group_id: String,
    /// When disabled, questions are still tracked but never replied to
    pub auto_reply_enabled: bool,
    /// Category allow-list; empty means all categories
    pub knowledge_categories: Vec<String>,
    /// Literal names that force engagement when mentioned
    pub bot_names: Vec<String>,
    /// Minimum 0-100 score to treat a match or question as actionable
    pub confidence_threshold: u8,
}

impl GroupConfig {
    /// Default settings for a group with no stored configuration
    pub fn for_group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            auto_reply_enabled: true,
            knowledge_categories: Vec::new(),
            bot_names: Vec::new(),
            confidence_threshold: 60,
        }
    }

    /// Parse a comma-separated bot-name list as stored by administration
    pub fn parse_bot_names(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Case-insensitive literal mention check against the configured names
    pub fn mentions_bot(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.bot_names
            .iter()
            .any(|name| !name.is_empty() && lowered.contains(&name.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builder() {
        let entry = KnowledgeEntry::new("如何建課", "前往後台點擊新增課程")
            .with_category("courses")
            .with_keywords(vec!["建課".to_string()]);

        assert_eq!(entry.question, "如何建課");
        assert_eq!(entry.category.as_deref(), Some("courses"));
        assert!(entry.is_active);
        assert_eq!(entry.usage_count, 0);
    }

    #[test]
    fn test_parse_bot_names() {
        let names = GroupConfig::parse_bot_names("小助手, HelpBot ,,  ");
        assert_eq!(names, vec!["小助手", "HelpBot"]);
    }

    #[test]
    fn test_mentions_bot_case_insensitive() {
        let mut config = GroupConfig::for_group("g1");
        config.bot_names = vec!["HelpBot".to_string(), "小助手".to_string()];

        assert!(config.mentions_bot("hey helpbot, are you there?"));
        assert!(config.mentions_bot("請問小助手這個怎麼用"));
        assert!(!config.mentions_bot("nobody mentioned"));
    }

    #[test]
    fn test_empty_bot_name_never_matches() {
        let mut config = GroupConfig::for_group("g1");
        config.bot_names = vec![String::new()];
        assert!(!config.mentions_bot("anything"));
    }
}
