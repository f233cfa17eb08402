//! Reply decision policy
//!
//! The central policy of the engine: given the mention signal, question
//! confidence, knowledge-match confidence and group configuration, decide
//! whether to reply, what to say, and whether to open a tracked issue.

pub mod engine;
pub mod pipeline;
pub mod safety;

pub use engine::{InboundMessage, ReplyDecision, ReplyDecisionEngine, ResolvedQuestion};
pub use pipeline::AutoReplyPipeline;
pub use safety::apply_safety_filter;
