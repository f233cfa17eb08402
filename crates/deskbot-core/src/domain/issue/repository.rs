//! Store traits for issues, audit logs, and group configuration

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::knowledge::GroupConfig;
use crate::error::Result;

use super::{AutoReplyLog, Issue, IssueStatus};

/// Persistence for tracked issues
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Insert a newly created issue
    async fn create(&self, issue: &Issue) -> Result<()>;

    /// Get an issue by ID
    async fn get(&self, id: &str) -> Result<Option<Issue>>;

    /// List issues for a group, most recent first
    async fn list_by_group(&self, group_id: &str, limit: usize) -> Result<Vec<Issue>>;

    /// List issues in a given status, most recent first
    async fn list_by_status(&self, status: IssueStatus, limit: usize) -> Result<Vec<Issue>>;

    /// Flip overdue pending issues to `Timeout`, returning how many changed
    ///
    /// This is the time-based sweep; no other automatic transition exists.
    async fn mark_timed_out(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Append-only persistence for auto-reply decision outcomes
#[async_trait]
pub trait AutoReplyLogStore: Send + Sync {
    /// Append one decision outcome
    async fn append(&self, log: &AutoReplyLog) -> Result<()>;

    /// Most recent log records for a group, oldest first, for rebuilding
    /// conversation context
    async fn recent_for_group(&self, group_id: &str, limit: usize) -> Result<Vec<AutoReplyLog>>;
}

/// Read access to per-group reply settings
#[async_trait]
pub trait GroupConfigProvider: Send + Sync {
    /// Get the group's settings, or defaults when none are stored
    async fn get(&self, group_id: &str) -> Result<GroupConfig>;
}
