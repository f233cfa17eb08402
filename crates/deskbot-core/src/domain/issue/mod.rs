//! Issue tracking
//!
//! A tracked customer question with a lifecycle independent of whether it
//! was auto-answered. The engine creates issues; their later resolution is
//! driven by human operators and the timeout sweep.

pub mod repository;

pub use repository::{AutoReplyLogStore, GroupConfigProvider, IssueStore};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::Sentiment;

/// Default minutes before a pending issue times out
pub const DEFAULT_TIMEOUT_MINUTES: i64 = 15;

/// Issue lifecycle state
///
/// `Pending -> Timeout` is driven by the time-based sweep; every other
/// transition out of `Pending` is a human-operator action. The engine
/// never transitions an issue after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Pending,
    Replied,
    WaitingCustomer,
    Timeout,
    Resolved,
    Ignored,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::Replied => "replied",
            IssueStatus::WaitingCustomer => "waiting_customer",
            IssueStatus::Timeout => "timeout",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IssueStatus::Pending),
            "replied" => Some(IssueStatus::Replied),
            "waiting_customer" => Some(IssueStatus::WaitingCustomer),
            "timeout" => Some(IssueStatus::Timeout),
            "resolved" => Some(IssueStatus::Resolved),
            "ignored" => Some(IssueStatus::Ignored),
            _ => None,
        }
    }
}

/// A tracked customer question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub group_id: String,
    pub customer_id: Option<String>,
    /// Reference to the triggering message, when the transport provides one
    pub message_id: Option<String>,
    pub question_summary: String,
    pub status: IssueStatus,
    pub sentiment: Sentiment,
    /// 0-100 question-detection confidence at creation time
    pub confidence: u8,
    pub suggested_reply: Option<String>,
    /// When the pending issue is considered overdue
    pub timeout_at: DateTime<Utc>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    /// Create a new pending issue with the default timeout
    pub fn new(group_id: impl Into<String>, question_summary: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            group_id: group_id.into(),
            customer_id: None,
            message_id: None,
            question_summary: question_summary.into(),
            status: IssueStatus::Pending,
            sentiment: Sentiment::Neutral,
            confidence: 0,
            suggested_reply: None,
            timeout_at: now + Duration::minutes(DEFAULT_TIMEOUT_MINUTES),
            replied_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = sentiment;
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.min(100);
        self
    }

    pub fn with_suggested_reply(mut self, reply: impl Into<String>) -> Self {
        self.suggested_reply = Some(reply.into());
        self
    }

    /// Override the timeout horizon
    pub fn with_timeout_minutes(mut self, minutes: i64) -> Self {
        self.timeout_at = self.created_at + Duration::minutes(minutes);
        self
    }

    /// Mark the issue as replied synchronously at creation time
    pub fn replied_at_creation(mut self) -> Self {
        self.status = IssueStatus::Replied;
        self.replied_at = Some(self.created_at);
        self
    }

    /// Whether the pending issue is overdue at `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == IssueStatus::Pending && now >= self.timeout_at
    }
}

/// Append-only record of one auto-reply decision outcome
///
/// Used for audit and for reconstructing conversation context in later
/// analyzer calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoReplyLog {
    pub id: String,
    pub group_id: String,
    pub question: String,
    /// Final answer sent, or None when the decision was not to answer
    pub answer: Option<String>,
    /// Cited knowledge entry, when one matched
    pub knowledge_id: Option<i64>,
    pub matched: bool,
    pub confidence: u8,
    pub created_at: DateTime<Utc>,
}

impl AutoReplyLog {
    pub fn new(
        group_id: impl Into<String>,
        question: impl Into<String>,
        answer: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            group_id: group_id.into(),
            question: question.into(),
            matched: answer.is_some(),
            answer,
            knowledge_id: None,
            confidence: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_knowledge(mut self, knowledge_id: i64) -> Self {
        self.knowledge_id = Some(knowledge_id);
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence.min(100);
        self
    }

    pub fn with_matched(mut self, matched: bool) -> Self {
        self.matched = matched;
        self
    }
}
