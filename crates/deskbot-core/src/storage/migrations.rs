//! Database migrations
//!
//! This module manages SQLite schema migrations for deskbot.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Knowledge base and group configuration
const MIGRATION_V1: &str = r#"
    -- Curated knowledge entries
    CREATE TABLE IF NOT EXISTS knowledge_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question TEXT NOT NULL,
        answer TEXT NOT NULL,
        category TEXT,
        keywords TEXT NOT NULL DEFAULT '[]',
        embedding TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        usage_count INTEGER NOT NULL DEFAULT 0,
        last_used_at TIMESTAMP,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_knowledge_entries_active ON knowledge_entries(is_active);
    CREATE INDEX IF NOT EXISTS idx_knowledge_entries_category ON knowledge_entries(category);

    -- Per-conversation reply settings
    CREATE TABLE IF NOT EXISTS group_configs (
        group_id TEXT PRIMARY KEY NOT NULL,
        auto_reply_enabled INTEGER NOT NULL DEFAULT 1,
        knowledge_categories TEXT NOT NULL DEFAULT '[]',
        bot_names TEXT NOT NULL DEFAULT '',
        confidence_threshold INTEGER NOT NULL DEFAULT 60,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 2: Issue tracking and auto-reply audit log
const MIGRATION_V2: &str = r#"
    -- Tracked customer questions
    CREATE TABLE IF NOT EXISTS issues (
        id TEXT PRIMARY KEY NOT NULL,
        group_id TEXT NOT NULL,
        customer_id TEXT,
        message_id TEXT,
        question_summary TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'replied', 'waiting_customer', 'timeout', 'resolved', 'ignored')),
        sentiment TEXT NOT NULL DEFAULT 'neutral'
            CHECK (sentiment IN ('positive', 'neutral', 'negative')),
        confidence INTEGER NOT NULL DEFAULT 0,
        suggested_reply TEXT,
        timeout_at TIMESTAMP NOT NULL,
        replied_at TIMESTAMP,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_issues_group_id ON issues(group_id);
    CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
    CREATE INDEX IF NOT EXISTS idx_issues_timeout_at ON issues(timeout_at);

    -- Append-only decision audit log
    CREATE TABLE IF NOT EXISTS auto_reply_logs (
        id TEXT PRIMARY KEY NOT NULL,
        group_id TEXT NOT NULL,
        question TEXT NOT NULL,
        answer TEXT,
        knowledge_id INTEGER REFERENCES knowledge_entries(id) ON DELETE SET NULL,
        matched INTEGER NOT NULL DEFAULT 0,
        confidence INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_auto_reply_logs_group_id ON auto_reply_logs(group_id);
    CREATE INDEX IF NOT EXISTS idx_auto_reply_logs_created_at ON auto_reply_logs(created_at);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let version: Option<(i32,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(version.and_then(|(v,)| (v > 0).then_some(v)).unwrap_or(0))
}

/// Record a migration as applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Knowledge base and group configuration");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Issue tracking and audit log");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_migrations_apply_cleanly() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let version = get_current_version(&pool).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let version = get_current_version(&pool).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_exist() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        for table in [
            "knowledge_entries",
            "group_configs",
            "issues",
            "auto_reply_logs",
        ] {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
