//! Retrieval orchestrator
//!
//! Chooses embedding similarity when an index exists and yields results,
//! and falls back to weighted lexical scoring otherwise. Both paths
//! normalize into a common 0-100 relevance so downstream policy never
//! cares which one ran. Retrieval errors degrade to "no candidates" and
//! never propagate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;

use super::entry::{MatchType, RetrievalCandidate};
use super::repository::KnowledgeRepository;
use super::scorer::score_entry;
use super::tokenizer::tokenize;

/// Number of candidates fetched from the embedding index
const VECTOR_TOP_K: usize = 5;

/// Minimum cosine similarity for an embedding hit
const VECTOR_SIMILARITY_THRESHOLD: f32 = 0.4;

/// Maximum candidates kept from the lexical fallback
const LEXICAL_LIMIT: usize = 10;

/// Computes query embeddings for the vector path
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Which retrieval path produced the candidates
///
/// Recorded for observability only; decision logic never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPath {
    Vector,
    Lexical,
    Empty,
}

/// Ranked candidates plus the path that produced them
#[derive(Debug)]
pub struct Retrieval {
    pub candidates: Vec<RetrievalCandidate>,
    pub path: RetrievalPath,
}

/// Hybrid retrieval over the knowledge base
pub struct RetrievalOrchestrator {
    repository: Arc<dyn KnowledgeRepository>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl RetrievalOrchestrator {
    pub fn new(repository: Arc<dyn KnowledgeRepository>) -> Self {
        Self {
            repository,
            embedder: None,
        }
    }

    /// Enable the vector path with the given query embedder
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Retrieve ranked candidates for a query
    ///
    /// `categories` is the group's allow-list; empty means all categories.
    pub async fn retrieve(&self, query: &str, categories: &[String]) -> Retrieval {
        match self.vector_candidates(query, categories).await {
            Ok(candidates) if !candidates.is_empty() => {
                debug!(
                    query = %query,
                    candidates = candidates.len(),
                    "Vector retrieval produced candidates"
                );
                return Retrieval {
                    candidates,
                    path: RetrievalPath::Vector,
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Vector retrieval failed, falling back to lexical");
            }
        }

        let candidates = match self.lexical_candidates(query, categories).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Lexical retrieval failed");
                Vec::new()
            }
        };

        let path = if candidates.is_empty() {
            RetrievalPath::Empty
        } else {
            RetrievalPath::Lexical
        };
        debug!(query = %query, candidates = candidates.len(), path = ?path, "Retrieval completed");

        Retrieval { candidates, path }
    }

    /// Best-effort usage bump for entries cited in an accepted answer
    ///
    /// Failures are swallowed; usage statistics must never block a reply.
    pub async fn mark_used(&self, entry_ids: &[i64]) {
        for id in entry_ids {
            if let Err(e) = self.repository.increment_usage(*id).await {
                warn!(entry_id = id, error = %e, "Failed to increment usage counter");
            }
        }
    }

    async fn vector_candidates(
        &self,
        query: &str,
        categories: &[String],
    ) -> Result<Vec<RetrievalCandidate>> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };

        if !self.repository.has_embeddings().await? {
            return Ok(Vec::new());
        }

        let query_embedding = embedder.embed(query).await?;
        let hits = self
            .repository
            .find_by_embedding(
                &query_embedding,
                VECTOR_TOP_K,
                VECTOR_SIMILARITY_THRESHOLD,
                categories,
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| RetrievalCandidate {
                relevance: (hit.similarity.clamp(0.0, 1.0) * 100.0).round() as u8,
                entry: hit.entry,
            })
            .collect())
    }

    async fn lexical_candidates(
        &self,
        query: &str,
        categories: &[String],
    ) -> Result<Vec<RetrievalCandidate>> {
        let entries = self.repository.find_active(categories).await?;
        let tokens = tokenize(query);

        let mut scored: Vec<(u32, RetrievalCandidate)> = entries
            .into_iter()
            .filter_map(|entry| {
                let score = score_entry(&tokens, &entry);
                if score.total == 0 {
                    return None;
                }
                let relevance = rescale_lexical(score.total, score.match_type);
                Some((score.total, RetrievalCandidate { entry, relevance }))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(LEXICAL_LIMIT);

        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }
}

/// Rescale a raw lexical score into the common 0-100 relevance
///
/// Question matches land highest; answer-body matches are the weakest
/// signal and cap lowest.
fn rescale_lexical(score: u32, match_type: MatchType) -> u8 {
    let relevance = match match_type {
        MatchType::Question => (50 + score).min(90),
        MatchType::Keyword => (40 + score).min(80),
        MatchType::Answer => (30 + score).min(70),
        MatchType::None => 0,
    };
    relevance as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::entry::KnowledgeEntry;
    use crate::domain::knowledge::repository::EmbeddingHit;
    use crate::error::Error;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted repository recording which paths were exercised
    #[derive(Default)]
    struct FakeRepository {
        entries: Vec<KnowledgeEntry>,
        embedding_hits: Vec<(i64, f32)>,
        fail_lexical: bool,
        lexical_called: AtomicBool,
        usage_increments: AtomicUsize,
    }

    impl FakeRepository {
        fn with_entries(entries: Vec<KnowledgeEntry>) -> Self {
            Self {
                entries,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl KnowledgeRepository for FakeRepository {
        async fn find_active(&self, categories: &[String]) -> Result<Vec<KnowledgeEntry>> {
            self.lexical_called.store(true, Ordering::SeqCst);
            if self.fail_lexical {
                return Err(Error::Retrieval("lexical unavailable".into()));
            }
            Ok(self
                .entries
                .iter()
                .filter(|e| {
                    categories.is_empty()
                        || e.category
                            .as_ref()
                            .is_some_and(|c| categories.contains(c))
                })
                .cloned()
                .collect())
        }

        async fn has_embeddings(&self) -> Result<bool> {
            Ok(!self.embedding_hits.is_empty())
        }

        async fn find_by_embedding(
            &self,
            _query: &[f32],
            k: usize,
            threshold: f32,
            _categories: &[String],
        ) -> Result<Vec<EmbeddingHit>> {
            let mut hits: Vec<EmbeddingHit> = self
                .embedding_hits
                .iter()
                .filter(|(_, sim)| *sim >= threshold)
                .filter_map(|(id, sim)| {
                    self.entries.iter().find(|e| e.id == *id).map(|e| EmbeddingHit {
                        entry: e.clone(),
                        similarity: *sim,
                    })
                })
                .collect();
            hits.truncate(k);
            Ok(hits)
        }

        async fn increment_usage(&self, _id: i64) -> Result<()> {
            self.usage_increments.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn insert(&self, _entry: &KnowledgeEntry) -> Result<i64> {
            unimplemented!("not used in these tests")
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn entry(id: i64, question: &str, answer: &str, keywords: &[&str]) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(question, answer)
            .with_keywords(keywords.iter().map(|k| k.to_string()).collect());
        e.id = id;
        e
    }

    #[tokio::test]
    async fn test_vector_path_skips_lexical() {
        let mut repo = FakeRepository::with_entries(vec![entry(1, "reset password", "...", &[])]);
        repo.embedding_hits = vec![(1, 0.9)];
        let repo = Arc::new(repo);

        let orchestrator =
            RetrievalOrchestrator::new(repo.clone()).with_embedder(Arc::new(FixedEmbedder));
        let result = orchestrator.retrieve("reset", &[]).await;

        assert_eq!(result.path, RetrievalPath::Vector);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].relevance, 90);
        assert!(!repo.lexical_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_below_threshold_falls_back_to_lexical() {
        let mut repo = FakeRepository::with_entries(vec![entry(1, "reset password", "...", &[])]);
        repo.embedding_hits = vec![(1, 0.2)];
        let repo = Arc::new(repo);

        let orchestrator =
            RetrievalOrchestrator::new(repo.clone()).with_embedder(Arc::new(FixedEmbedder));
        let result = orchestrator.retrieve("reset password", &[]).await;

        assert_eq!(result.path, RetrievalPath::Lexical);
        assert!(repo.lexical_called.load(Ordering::SeqCst));
        assert!(!result.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_no_embedder_uses_lexical() {
        let repo = Arc::new(FakeRepository::with_entries(vec![entry(
            1,
            "reset password",
            "...",
            &[],
        )]));
        let orchestrator = RetrievalOrchestrator::new(repo.clone());
        let result = orchestrator.retrieve("reset password", &[]).await;

        assert_eq!(result.path, RetrievalPath::Lexical);
    }

    #[tokio::test]
    async fn test_errors_degrade_to_empty() {
        let mut repo = FakeRepository::default();
        repo.fail_lexical = true;
        let orchestrator = RetrievalOrchestrator::new(Arc::new(repo));

        let result = orchestrator.retrieve("anything", &[]).await;
        assert_eq!(result.path, RetrievalPath::Empty);
        assert!(result.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_empty_knowledge_base() {
        let orchestrator = RetrievalOrchestrator::new(Arc::new(FakeRepository::default()));
        let result = orchestrator.retrieve("如何建課", &[]).await;
        assert_eq!(result.path, RetrievalPath::Empty);
        assert!(result.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_lexical_ranking_and_cap() {
        let mut entries = vec![entry(1, "如何建課", "前往後台點擊新增課程", &["建課"])];
        for i in 2..=15 {
            entries.push(entry(i, "other topic entirely", "some body 課程", &[]));
        }
        let orchestrator =
            RetrievalOrchestrator::new(Arc::new(FakeRepository::with_entries(entries)));

        let result = orchestrator.retrieve("怎麼建立課程", &[]).await;
        assert_eq!(result.path, RetrievalPath::Lexical);
        assert!(result.candidates.len() <= 10);
        // The abbreviated-keyword entry surfaces as top candidate
        assert_eq!(result.candidates[0].entry.id, 1);
    }

    #[tokio::test]
    async fn test_mark_used_swallows_nothing_and_counts() {
        let repo = Arc::new(FakeRepository::with_entries(vec![]));
        let orchestrator = RetrievalOrchestrator::new(repo.clone());
        orchestrator.mark_used(&[1, 2, 3]).await;
        assert_eq!(repo.usage_increments.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rescale_clamps() {
        assert_eq!(rescale_lexical(10, MatchType::Question), 60);
        assert_eq!(rescale_lexical(100, MatchType::Question), 90);
        assert_eq!(rescale_lexical(100, MatchType::Keyword), 80);
        assert_eq!(rescale_lexical(100, MatchType::Answer), 70);
        assert_eq!(rescale_lexical(100, MatchType::None), 0);
    }
}
