//! SQLite implementations of the issue and auto-reply log stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::domain::conversation::Sentiment;
use crate::domain::issue::{AutoReplyLog, AutoReplyLogStore, Issue, IssueStatus, IssueStore};
use crate::error::{Error, Result};

/// SQLite implementation of the issue store
#[derive(Clone)]
pub struct SqliteIssueStore {
    pool: SqlitePool,
}

impl SqliteIssueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IssueStore for SqliteIssueStore {
    async fn create(&self, issue: &Issue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO issues (
                id, group_id, customer_id, message_id, question_summary,
                status, sentiment, confidence, suggested_reply,
                timeout_at, replied_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&issue.id)
        .bind(&issue.group_id)
        .bind(&issue.customer_id)
        .bind(&issue.message_id)
        .bind(&issue.question_summary)
        .bind(issue.status.as_str())
        .bind(issue.sentiment.as_str())
        .bind(issue.confidence as i64)
        .bind(&issue.suggested_reply)
        .bind(issue.timeout_at)
        .bind(issue.replied_at)
        .bind(issue.created_at)
        .bind(issue.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(issue_id = %issue.id, group_id = %issue.group_id, "Issue created");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Issue>> {
        let row: Option<IssueRow> = sqlx::query_as("SELECT * FROM issues WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.into_issue()).transpose()
    }

    async fn list_by_group(&self, group_id: &str, limit: usize) -> Result<Vec<Issue>> {
        let rows: Vec<IssueRow> = sqlx::query_as(
            "SELECT * FROM issues WHERE group_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(group_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| r.into_issue()).collect()
    }

    async fn list_by_status(&self, status: IssueStatus, limit: usize) -> Result<Vec<Issue>> {
        let rows: Vec<IssueRow> = sqlx::query_as(
            "SELECT * FROM issues WHERE status = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| r.into_issue()).collect()
    }

    async fn mark_timed_out(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE issues SET status = 'timeout', updated_at = ? \
             WHERE status = 'pending' AND timeout_at <= ?",
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            info!(swept = swept, "Pending issues timed out");
        }
        Ok(swept)
    }
}

/// SQLite implementation of the auto-reply log store
#[derive(Clone)]
pub struct SqliteAutoReplyLogStore {
    pool: SqlitePool,
}

impl SqliteAutoReplyLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AutoReplyLogStore for SqliteAutoReplyLogStore {
    async fn append(&self, log: &AutoReplyLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auto_reply_logs (
                id, group_id, question, answer, knowledge_id,
                matched, confidence, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.group_id)
        .bind(&log.question)
        .bind(&log.answer)
        .bind(log.knowledge_id)
        .bind(log.matched)
        .bind(log.confidence as i64)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_for_group(&self, group_id: &str, limit: usize) -> Result<Vec<AutoReplyLog>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT * FROM auto_reply_logs WHERE group_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(group_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // Fetched newest-first to apply the limit, returned oldest-first
        let mut logs: Vec<AutoReplyLog> = rows.into_iter().map(LogRow::into_log).collect();
        logs.reverse();
        Ok(logs)
    }
}

#[derive(FromRow)]
struct IssueRow {
    id: String,
    group_id: String,
    customer_id: Option<String>,
    message_id: Option<String>,
    question_summary: String,
    status: String,
    sentiment: String,
    confidence: i64,
    suggested_reply: Option<String>,
    timeout_at: DateTime<Utc>,
    replied_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IssueRow {
    fn into_issue(self) -> Result<Issue> {
        let status = IssueStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Unknown issue status: {}", self.status)))?;
        let sentiment = Sentiment::parse(&self.sentiment);

        Ok(Issue {
            id: self.id,
            group_id: self.group_id,
            customer_id: self.customer_id,
            message_id: self.message_id,
            question_summary: self.question_summary,
            status,
            sentiment,
            confidence: self.confidence.clamp(0, 100) as u8,
            suggested_reply: self.suggested_reply,
            timeout_at: self.timeout_at,
            replied_at: self.replied_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct LogRow {
    id: String,
    group_id: String,
    question: String,
    answer: Option<String>,
    knowledge_id: Option<i64>,
    matched: bool,
    confidence: i64,
    created_at: DateTime<Utc>,
}

impl LogRow {
    fn into_log(self) -> AutoReplyLog {
        AutoReplyLog {
            id: self.id,
            group_id: self.group_id,
            question: self.question,
            answer: self.answer,
            knowledge_id: self.knowledge_id,
            matched: self.matched,
            confidence: self.confidence.clamp(0, 100) as u8,
            created_at: self.created_at,
        }
    }
}
