//! SQLite implementation of the KnowledgeRepository
//!
//! Keywords and embeddings are stored as JSON text columns. Embedding
//! similarity is ranked in-process over the active embedded rows; the
//! corpus is a curated knowledge base, small enough that a vector index
//! extension would buy nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::knowledge::{EmbeddingHit, KnowledgeEntry, KnowledgeRepository};
use crate::error::{Error, Result};

/// SQLite implementation of the knowledge repository
#[derive(Clone)]
pub struct SqliteKnowledgeRepository {
    pool: SqlitePool,
}

impl SqliteKnowledgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_active(&self, categories: &[String]) -> Result<Vec<KnowledgeEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT * FROM knowledge_entries WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(|r| r.into_entry())
            .collect::<Result<Vec<_>>>()?;

        if categories.is_empty() {
            return Ok(entries);
        }
        Ok(entries
            .into_iter()
            .filter(|e| e.category.as_ref().is_some_and(|c| categories.contains(c)))
            .collect())
    }
}

#[async_trait]
impl KnowledgeRepository for SqliteKnowledgeRepository {
    async fn find_active(&self, categories: &[String]) -> Result<Vec<KnowledgeEntry>> {
        self.load_active(categories).await
    }

    async fn has_embeddings(&self) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM knowledge_entries WHERE is_active = 1 AND embedding IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn find_by_embedding(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
        categories: &[String],
    ) -> Result<Vec<EmbeddingHit>> {
        let entries = self.load_active(categories).await?;

        let mut hits: Vec<EmbeddingHit> = entries
            .into_iter()
            .filter_map(|entry| {
                let similarity = entry
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(query, e))?;
                (similarity >= threshold).then_some(EmbeddingHit { entry, similarity })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        debug!(hits = hits.len(), threshold = threshold, "Embedding search completed");
        Ok(hits)
    }

    async fn increment_usage(&self, id: i64) -> Result<()> {
        // Relative increment keeps concurrent updates commutative
        sqlx::query(
            "UPDATE knowledge_entries SET usage_count = usage_count + 1, last_used_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert(&self, entry: &KnowledgeEntry) -> Result<i64> {
        let keywords = serde_json::to_string(&entry.keywords)
            .map_err(|e| Error::Other(format!("Failed to serialize keywords: {}", e)))?;
        let embedding = entry
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Other(format!("Failed to serialize embedding: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO knowledge_entries (
                question, answer, category, keywords, embedding,
                is_active, usage_count, last_used_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.question)
        .bind(&entry.answer)
        .bind(&entry.category)
        .bind(&keywords)
        .bind(&embedding)
        .bind(entry.is_active)
        .bind(entry.usage_count)
        .bind(entry.last_used_at)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

/// Cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }
    dot / (magnitude_a * magnitude_b)
}

#[derive(FromRow)]
struct EntryRow {
    id: i64,
    question: String,
    answer: String,
    category: Option<String>,
    keywords: String,
    embedding: Option<String>,
    is_active: bool,
    usage_count: i64,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EntryRow {
    fn into_entry(self) -> Result<KnowledgeEntry> {
        let keywords: Vec<String> = serde_json::from_str(&self.keywords)
            .map_err(|e| Error::Other(format!("Corrupt keywords for entry {}: {}", self.id, e)))?;
        let embedding: Option<Vec<f32>> = self
            .embedding
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Other(format!("Corrupt embedding for entry {}: {}", self.id, e)))?;

        Ok(KnowledgeEntry {
            id: self.id,
            question: self.question,
            answer: self.answer,
            category: self.category,
            keywords,
            embedding,
            is_active: self.is_active,
            usage_count: self.usage_count,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn repo() -> (Database, SqliteKnowledgeRepository) {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteKnowledgeRepository::new(db.pool().clone());
        (db, repo)
    }

    fn entry(question: &str, category: Option<&str>) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(question, "answer body")
            .with_keywords(vec!["kw".to_string()]);
        e.category = category.map(str::to_string);
        e
    }

    #[tokio::test]
    async fn test_insert_and_find_active() {
        let (_db, repo) = repo().await;
        let id = repo.insert(&entry("q1", None)).await.unwrap();
        assert!(id > 0);

        let entries = repo.find_active(&[]).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].question, "q1");
        assert_eq!(entries[0].keywords, vec!["kw"]);
    }

    #[tokio::test]
    async fn test_inactive_entries_never_returned() {
        let (_db, repo) = repo().await;
        let mut inactive = entry("hidden", None);
        inactive.is_active = false;
        repo.insert(&inactive).await.unwrap();
        repo.insert(&entry("visible", None)).await.unwrap();

        let entries = repo.find_active(&[]).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].question, "visible");
    }

    #[tokio::test]
    async fn test_category_filter() {
        let (_db, repo) = repo().await;
        repo.insert(&entry("billing q", Some("billing"))).await.unwrap();
        repo.insert(&entry("course q", Some("courses"))).await.unwrap();
        repo.insert(&entry("uncategorized q", None)).await.unwrap();

        let entries = repo.find_active(&["billing".to_string()]).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].question, "billing q");

        // Empty allow-list means all categories
        let all = repo.find_active(&[]).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_embedding_search() {
        let (_db, repo) = repo().await;
        repo.insert(&entry("no embedding", None)).await.unwrap();
        repo.insert(&entry("close", None).with_embedding(vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        repo.insert(&entry("far", None).with_embedding(vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();

        assert!(repo.has_embeddings().await.unwrap());

        let hits = repo
            .find_by_embedding(&[1.0, 0.0, 0.0], 5, 0.4, &[])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.question, "close");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_has_embeddings_false_when_none() {
        let (_db, repo) = repo().await;
        repo.insert(&entry("plain", None)).await.unwrap();
        assert!(!repo.has_embeddings().await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_usage() {
        let (_db, repo) = repo().await;
        let id = repo.insert(&entry("q", None)).await.unwrap();

        repo.increment_usage(id).await.unwrap();
        repo.increment_usage(id).await.unwrap();

        let entries = repo.find_active(&[]).await.unwrap();
        assert_eq!(entries[0].usage_count, 2);
        assert!(entries[0].last_used_at.is_some());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
