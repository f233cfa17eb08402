//! Conversation analysis
//!
//! Builds a bounded recent-message window and determines whether questions
//! in it remain unanswered. The semantic judgment is delegated to the
//! answer-generator interface; this module owns window construction,
//! confidence normalization and status aggregation.

pub mod analyzer;

pub use analyzer::{normalize_confidence, AnalyzedConversation, ConversationAnalyzer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in a group conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp,
        }
    }
}

/// Overall sentiment of a conversation or question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

/// Lifecycle status of a question identified in the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Unanswered,
    Answered,
    Abandoned,
}

/// A question identified by conversation analysis
///
/// Derived per analysis call; never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationQuestion {
    #[serde(alias = "question")]
    pub text: String,
    pub status: QuestionStatus,
    #[serde(default)]
    pub answered_by: Option<String>,
}

/// Raw whole-window judgment returned by the generator interface
///
/// The confidence is on whatever scale the backing model reported; the
/// analyzer normalizes it to 0-100.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationAnalysis {
    #[serde(default)]
    pub has_unanswered_question: bool,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub all_questions: Vec<ConversationQuestion>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
}

/// Single-message question judgment from the generator interface
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionAnalysis {
    #[serde(default)]
    pub is_question: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub suggested_tags: Vec<String>,
}
