//! Auto-reply pipeline
//!
//! Wires one inbound message through group configuration, conversation
//! analysis and the decision engine. Each message is one logical task;
//! nothing is shared across messages except the backing stores.

use std::sync::Arc;

use tracing::warn;

use crate::domain::conversation::{AnalyzedConversation, ChatMessage, ConversationAnalyzer};
use crate::domain::issue::{AutoReplyLog, AutoReplyLogStore, GroupConfigProvider};
use crate::domain::knowledge::GroupConfig;

use super::engine::{InboundMessage, ReplyDecision, ReplyDecisionEngine};

/// Prior auto-replies merged into the analysis window
const CONTEXT_LOG_LIMIT: usize = 10;

/// End-to-end handling of one inbound message
pub struct AutoReplyPipeline {
    groups: Arc<dyn GroupConfigProvider>,
    logs: Arc<dyn AutoReplyLogStore>,
    analyzer: ConversationAnalyzer,
    engine: ReplyDecisionEngine,
}

impl AutoReplyPipeline {
    pub fn new(
        groups: Arc<dyn GroupConfigProvider>,
        logs: Arc<dyn AutoReplyLogStore>,
        analyzer: ConversationAnalyzer,
        engine: ReplyDecisionEngine,
    ) -> Self {
        Self {
            groups,
            logs,
            analyzer,
            engine,
        }
    }

    /// Process one inbound message with its recent conversation history
    ///
    /// `recent` holds prior messages in the conversation, oldest first,
    /// excluding the inbound message itself.
    pub async fn handle_message(
        &self,
        message: &InboundMessage,
        recent: &[ChatMessage],
    ) -> ReplyDecision {
        let config = match self.groups.get(&message.group_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(group_id = %message.group_id, error = %e, "Failed to load group config, using defaults");
                GroupConfig::for_group(&message.group_id)
            }
        };

        let forced = message.direct_chat || config.mentions_bot(&message.text);
        let analysis = if forced {
            // Question detection is skipped entirely
            AnalyzedConversation {
                has_unanswered_question: true,
                unanswered: vec![message.text.clone()],
                confidence: 100,
                summary: None,
                sentiment: Default::default(),
            }
        } else {
            let prior = self.prior_replies(&message.group_id).await;
            let mut window = recent.to_vec();
            window.push(ChatMessage::new(
                message.customer_id.clone().unwrap_or_else(|| "customer".to_string()),
                message.text.clone(),
                chrono::Utc::now(),
            ));
            self.analyzer.analyze(&window, &prior).await
        };

        self.engine.decide(message, &config, &analysis).await
    }

    async fn prior_replies(&self, group_id: &str) -> Vec<AutoReplyLog> {
        match self.logs.recent_for_group(group_id, CONTEXT_LOG_LIMIT).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "Failed to load prior replies for context");
                Vec::new()
            }
        }
    }
}
