//! Knowledge base retrieval
//!
//! This module implements hybrid retrieval over the curated knowledge
//! corpus: embedding similarity when an index exists, with a weighted
//! lexical fallback built on stop-word-filtered, n-gram-expanded tokens.

pub mod entry;
pub mod repository;
pub mod retrieval;
pub mod scorer;
pub mod tokenizer;

pub use entry::{GroupConfig, KnowledgeEntry, MatchType, RetrievalCandidate};
pub use repository::{EmbeddingHit, KnowledgeRepository};
pub use retrieval::{RetrievalOrchestrator, RetrievalPath};
pub use scorer::{score_entry, LexicalScore};
pub use tokenizer::tokenize;
