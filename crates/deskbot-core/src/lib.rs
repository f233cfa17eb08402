//! Deskbot Core Library
//!
//! This crate provides the core functionality for Deskbot, including:
//! - Hybrid knowledge retrieval (embedding similarity with lexical fallback)
//! - Conversation analysis over a bounded recent-message window
//! - The reply-or-track decision policy for group chats
//! - Issue tracking with a timeout lifecycle
//! - Storage (SQLite) and LLM integration (OpenAI-compatible chat API)

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::decision::{AutoReplyPipeline, ReplyDecision, ReplyDecisionEngine};
    pub use crate::domain::knowledge::{KnowledgeEntry, RetrievalCandidate, RetrievalOrchestrator};
    pub use crate::error::{Error, Result};
}
