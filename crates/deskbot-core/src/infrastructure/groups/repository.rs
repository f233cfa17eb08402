//! SQLite implementation of the group configuration provider
//!
//! A group with no stored row gets the built-in defaults; storage is only
//! consulted, never written, on the message-handling path.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::issue::GroupConfigProvider;
use crate::domain::knowledge::GroupConfig;
use crate::error::{Error, Result};

/// SQLite implementation of the group configuration provider
#[derive(Clone)]
pub struct SqliteGroupConfigProvider {
    pool: SqlitePool,
}

impl SqliteGroupConfigProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a group's settings (administration path)
    pub async fn upsert(&self, config: &GroupConfig) -> Result<()> {
        if config.confidence_threshold > 100 {
            return Err(Error::InvalidInput(format!(
                "Confidence threshold must be 0-100, got {}",
                config.confidence_threshold
            )));
        }
        let categories = serde_json::to_string(&config.knowledge_categories)
            .map_err(|e| Error::Other(format!("Failed to serialize categories: {}", e)))?;
        let bot_names = config.bot_names.join(",");

        sqlx::query(
            r#"
            INSERT INTO group_configs (
                group_id, auto_reply_enabled, knowledge_categories,
                bot_names, confidence_threshold
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(group_id) DO UPDATE SET
                auto_reply_enabled = excluded.auto_reply_enabled,
                knowledge_categories = excluded.knowledge_categories,
                bot_names = excluded.bot_names,
                confidence_threshold = excluded.confidence_threshold,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&config.group_id)
        .bind(config.auto_reply_enabled)
        .bind(&categories)
        .bind(&bot_names)
        .bind(config.confidence_threshold as i64)
        .execute(&self.pool)
        .await?;

        debug!(group_id = %config.group_id, "Group config saved");
        Ok(())
    }
}

#[async_trait]
impl GroupConfigProvider for SqliteGroupConfigProvider {
    async fn get(&self, group_id: &str) -> Result<GroupConfig> {
        let row: Option<ConfigRow> =
            sqlx::query_as("SELECT * FROM group_configs WHERE group_id = ?")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => row.into_config(),
            None => Ok(GroupConfig::for_group(group_id)),
        }
    }
}

#[derive(FromRow)]
struct ConfigRow {
    group_id: String,
    auto_reply_enabled: bool,
    knowledge_categories: String,
    bot_names: String,
    confidence_threshold: i64,
}

impl ConfigRow {
    fn into_config(self) -> Result<GroupConfig> {
        let knowledge_categories: Vec<String> = serde_json::from_str(&self.knowledge_categories)
            .map_err(|e| {
                Error::Other(format!(
                    "Corrupt categories for group {}: {}",
                    self.group_id, e
                ))
            })?;

        Ok(GroupConfig {
            group_id: self.group_id,
            auto_reply_enabled: self.auto_reply_enabled,
            knowledge_categories,
            bot_names: GroupConfig::parse_bot_names(&self.bot_names),
            confidence_threshold: self.confidence_threshold.clamp(0, 100) as u8,
        })
    }
}
