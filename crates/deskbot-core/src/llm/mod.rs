//! LLM integration
//!
//! This module provides:
//! - An HTTP client for OpenAI-compatible chat and embedding endpoints
//! - Request/response wire types
//! - An explicit cached-credential struct for token-exchanging providers
//! - The `AnswerGenerator` interface the decision pipeline depends on,
//!   with an LLM-backed implementation and a fallible decode step

mod client;
mod generator;
mod token;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use generator::{AnswerGenerator, AnswerResult, LlmAnswerGenerator};
pub use token::CachedToken;
pub use types::{ChatRequest, ChatResponse, Message, MessageRole, Usage};
