//! Repository trait for knowledge base persistence
//!
//! Abstracts over the storage backend. Inactive entries are never returned
//! by any query on this trait.

use async_trait::async_trait;

use crate::error::Result;

use super::entry::KnowledgeEntry;

/// An entry matched by embedding similarity
#[derive(Debug, Clone)]
pub struct EmbeddingHit {
    pub entry: KnowledgeEntry,
    /// Cosine similarity, 0.0 to 1.0
    pub similarity: f32,
}

/// Repository trait for knowledge base persistence
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// List all active entries, optionally filtered by a category allow-list
    /// (empty list means all categories)
    async fn find_active(&self, categories: &[String]) -> Result<Vec<KnowledgeEntry>>;

    /// Whether at least one active entry carries an embedding
    async fn has_embeddings(&self) -> Result<bool>;

    /// Top-k active entries by cosine similarity against the query vector,
    /// keeping only hits at or above `threshold`
    async fn find_by_embedding(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
        categories: &[String],
    ) -> Result<Vec<EmbeddingHit>>;

    /// Increment the usage counter and stamp `last_used_at`
    ///
    /// Increments are commutative; concurrent calls from different messages
    /// must not lose counts.
    async fn increment_usage(&self, id: i64) -> Result<()>;

    /// Insert a new entry, returning its assigned ID
    async fn insert(&self, entry: &KnowledgeEntry) -> Result<i64>;
}
