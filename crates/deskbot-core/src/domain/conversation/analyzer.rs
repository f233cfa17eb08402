//! Conversation analyzer
//!
//! Merges recent messages with prior auto-replies into a chronological
//! window, delegates the semantic judgment to the answer-generator
//! interface, and aggregates the per-question statuses. On external
//! failure it fails safe: a question may exist, at confidence 50.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::issue::AutoReplyLog;
use crate::llm::AnswerGenerator;

use super::{ChatMessage, QuestionStatus, Sentiment};

/// Default bound on the recent-message window
const DEFAULT_WINDOW_SIZE: usize = 10;

/// Confidence assumed when the external analysis fails
const FAIL_SAFE_CONFIDENCE: u8 = 50;

/// Aggregated analysis of a conversation window
#[derive(Debug, Clone)]
pub struct AnalyzedConversation {
    pub has_unanswered_question: bool,
    /// Unanswered question texts, oldest first
    pub unanswered: Vec<String>,
    /// Normalized 0-100 confidence
    pub confidence: u8,
    pub summary: Option<String>,
    pub sentiment: Sentiment,
}

impl AnalyzedConversation {
    /// Conservative result used when the external judgment is unavailable:
    /// never silently drop a potential question, never assert confidence
    /// the analysis cannot justify.
    fn fail_safe() -> Self {
        Self {
            has_unanswered_question: true,
            unanswered: Vec::new(),
            confidence: FAIL_SAFE_CONFIDENCE,
            summary: None,
            sentiment: Sentiment::Neutral,
        }
    }
}

/// Normalize a reported confidence to the 0-100 scale
///
/// Values in (0, 1] are treated as fractions and multiplied by 100, so
/// exactly 1.0 means 100. Values above 1 are taken as percentages already.
pub fn normalize_confidence(raw: f64) -> u8 {
    if raw <= 0.0 {
        0
    } else if raw <= 1.0 {
        (raw * 100.0).round() as u8
    } else {
        raw.min(100.0).round() as u8
    }
}

/// Window-building and status-aggregation over recent messages
pub struct ConversationAnalyzer {
    generator: Arc<dyn AnswerGenerator>,
    window_size: usize,
}

impl ConversationAnalyzer {
    pub fn new(generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            generator,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }

    /// Override the recent-message window bound
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    /// Merge recent messages with prior auto-replies, chronologically,
    /// keeping the most recent `window_size` entries.
    pub fn build_window(
        &self,
        messages: &[ChatMessage],
        prior_replies: &[AutoReplyLog],
    ) -> Vec<ChatMessage> {
        let mut window: Vec<ChatMessage> = messages.to_vec();
        window.extend(prior_replies.iter().filter_map(|log| {
            log.answer
                .as_ref()
                .map(|answer| ChatMessage::new("bot", answer.clone(), log.created_at))
        }));

        window.sort_by_key(|m| m.timestamp);
        if window.len() > self.window_size {
            window.drain(..window.len() - self.window_size);
        }
        window
    }

    /// Analyze a conversation window for unanswered questions
    pub async fn analyze(
        &self,
        messages: &[ChatMessage],
        prior_replies: &[AutoReplyLog],
    ) -> AnalyzedConversation {
        let window = self.build_window(messages, prior_replies);
        if window.is_empty() {
            return AnalyzedConversation {
                has_unanswered_question: false,
                unanswered: Vec::new(),
                confidence: 0,
                summary: None,
                sentiment: Sentiment::Neutral,
            };
        }

        let analysis = match self.generator.analyze_conversation(&window).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "Conversation analysis failed, assuming a question may exist");
                return AnalyzedConversation::fail_safe();
            }
        };

        let mut unanswered: Vec<String> = analysis
            .all_questions
            .iter()
            .filter(|q| q.status == QuestionStatus::Unanswered)
            .map(|q| q.text.clone())
            .collect();

        // The model sometimes sets the top-level flag without itemizing;
        // fall back to its single reported question.
        if unanswered.is_empty() && analysis.has_unanswered_question {
            if let Some(question) = &analysis.question {
                if !question.trim().is_empty() {
                    unanswered.push(question.clone());
                }
            }
        }

        let confidence = normalize_confidence(analysis.confidence);
        debug!(
            window = window.len(),
            unanswered = unanswered.len(),
            confidence = confidence,
            "Conversation analyzed"
        );

        AnalyzedConversation {
            has_unanswered_question: analysis.has_unanswered_question || !unanswered.is_empty(),
            unanswered,
            confidence,
            summary: analysis.summary,
            sentiment: analysis.sentiment,
        }
    }
}
