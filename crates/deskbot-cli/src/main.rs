//! Deskbot CLI - auto-reply decision engine for support group chats

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use deskbot_core::config::Config;
use deskbot_core::domain::conversation::ConversationAnalyzer;
use deskbot_core::domain::decision::{AutoReplyPipeline, InboundMessage, ReplyDecisionEngine};
use deskbot_core::domain::issue::{GroupConfigProvider, IssueStatus, IssueStore};
use deskbot_core::domain::knowledge::{
    GroupConfig, KnowledgeEntry, KnowledgeRepository, RetrievalOrchestrator,
};
use deskbot_core::infrastructure::{
    SqliteAutoReplyLogStore, SqliteGroupConfigProvider, SqliteIssueStore, SqliteKnowledgeRepository,
};
use deskbot_core::llm::{LlmAnswerGenerator, LlmClient};
use deskbot_core::storage::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "deskbot")]
#[command(author, version, about = "Auto-reply decision engine for support group chats", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file path (defaults to the config directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and default configuration
    Init,

    /// Manage knowledge entries
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },

    /// Manage group reply settings
    Groups {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Run one message through the decision pipeline
    Process {
        /// Group the message arrived in
        #[arg(short, long)]
        group: String,
        /// Message text
        text: String,
        /// Sender identifier
        #[arg(short, long)]
        customer: Option<String>,
        /// Treat as a one-to-one chat
        #[arg(long)]
        direct: bool,
    },

    /// Manage tracked issues
    Issues {
        #[command(subcommand)]
        action: IssueAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Add a question/answer entry
    Add {
        question: String,
        answer: String,
        #[arg(short, long)]
        category: Option<String>,
        /// Comma-separated keywords
        #[arg(short, long)]
        keywords: Option<String>,
    },
    /// List active entries
    List {
        #[arg(short, long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Show a group's effective settings
    Show { group_id: String },
    /// Update a group's settings
    Set {
        group_id: String,
        #[arg(long)]
        auto_reply: Option<bool>,
        /// Comma-separated bot names
        #[arg(long)]
        bot_names: Option<String>,
        /// Comma-separated category allow-list
        #[arg(long)]
        categories: Option<String>,
        #[arg(long)]
        threshold: Option<u8>,
    },
}

#[derive(Subcommand)]
enum IssueAction {
    /// List issues for a group
    List {
        group_id: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Filter by status (pending, replied, timeout, ...)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Flip overdue pending issues to timeout
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("deskbot=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let db_config = match &cli.db {
        Some(path) => DatabaseConfig::with_path(path),
        None => DatabaseConfig::default(),
    };
    let db = Database::new(db_config).await?;

    match cli.command {
        Commands::Init => cmd_init(&db, cli.quiet).await,
        Commands::Knowledge { action } => cmd_knowledge(&db, action, cli.quiet).await,
        Commands::Groups { action } => cmd_groups(&db, action, cli.quiet).await,
        Commands::Process {
            group,
            text,
            customer,
            direct,
        } => cmd_process(&db, &group, &text, customer.as_deref(), direct, cli.quiet).await,
        Commands::Issues { action } => cmd_issues(&db, action, cli.quiet).await,
        Commands::Doctor => cmd_doctor(&db, cli.quiet).await,
    }
}

async fn cmd_init(db: &Database, quiet: bool) -> anyhow::Result<()> {
    db.migrate().await?;
    info!(path = %db.path().display(), "Database initialized");

    let config_path = Config::config_path()?;
    if !config_path.exists() {
        Config::default().save()?;
    }

    if !quiet {
        println!("Database ready: {}", db.path().display());
        println!("Configuration: {}", config_path.display());
        println!("\nNext steps:");
        println!("  1. Set DESKBOT_API_KEY (or OPENAI_API_KEY)");
        println!("  2. Add entries with `deskbot knowledge add <question> <answer>`");
        println!("  3. Try a message with `deskbot process --group <id> <text>`");
    }
    Ok(())
}

async fn cmd_knowledge(db: &Database, action: KnowledgeAction, quiet: bool) -> anyhow::Result<()> {
    let repo = SqliteKnowledgeRepository::new(db.pool().clone());

    match action {
        KnowledgeAction::Add {
            question,
            answer,
            category,
            keywords,
        } => {
            let mut entry = KnowledgeEntry::new(question, answer);
            if let Some(category) = category {
                entry = entry.with_category(category);
            }
            if let Some(keywords) = keywords {
                entry = entry.with_keywords(
                    keywords
                        .split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect(),
                );
            }

            let id = repo.insert(&entry).await?;
            if !quiet {
                println!("Entry created: {}", id);
            }
        }
        KnowledgeAction::List { category } => {
            let categories: Vec<String> = category.into_iter().collect();
            let entries = repo.find_active(&categories).await?;
            if entries.is_empty() {
                if !quiet {
                    println!("No entries found.");
                    println!("\nAdd one with: deskbot knowledge add <question> <answer>");
                }
            } else {
                for e in entries {
                    let category = e.category.as_deref().unwrap_or("-");
                    let indexed = if e.embedding.is_some() { " [indexed]" } else { "" };
                    println!(
                        "  {} [{}] {} (used {}){}",
                        e.id, category, e.question, e.usage_count, indexed
                    );
                }
            }
        }
    }
    Ok(())
}

async fn cmd_groups(db: &Database, action: GroupAction, quiet: bool) -> anyhow::Result<()> {
    let provider = SqliteGroupConfigProvider::new(db.pool().clone());

    match action {
        GroupAction::Show { group_id } => {
            let config = provider.get(&group_id).await?;
            println!("Group: {}", config.group_id);
            println!("  Auto-reply: {}", config.auto_reply_enabled);
            println!("  Threshold: {}", config.confidence_threshold);
            println!(
                "  Bot names: {}",
                if config.bot_names.is_empty() {
                    "(none)".to_string()
                } else {
                    config.bot_names.join(", ")
                }
            );
            println!(
                "  Categories: {}",
                if config.knowledge_categories.is_empty() {
                    "(all)".to_string()
                } else {
                    config.knowledge_categories.join(", ")
                }
            );
        }
        GroupAction::Set {
            group_id,
            auto_reply,
            bot_names,
            categories,
            threshold,
        } => {
            let mut config = provider.get(&group_id).await?;
            if let Some(enabled) = auto_reply {
                config.auto_reply_enabled = enabled;
            }
            if let Some(names) = bot_names {
                config.bot_names = GroupConfig::parse_bot_names(&names);
            }
            if let Some(categories) = categories {
                config.knowledge_categories = categories
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
            }
            if let Some(threshold) = threshold {
                config.confidence_threshold = threshold;
            }
            provider.upsert(&config).await?;
            if !quiet {
                println!("Group '{}' updated.", group_id);
            }
        }
    }
    Ok(())
}

async fn cmd_process(
    db: &Database,
    group: &str,
    text: &str,
    customer: Option<&str>,
    direct: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let api_key = config
        .llm
        .resolved_api_key()?
        .ok_or_else(|| anyhow::anyhow!("No API key. Set DESKBOT_API_KEY or OPENAI_API_KEY."))?;

    let client = Arc::new(
        LlmClient::builder()
            .config(config.llm.clone())
            .api_key(api_key)
            .build()?,
    );
    let generator = Arc::new(LlmAnswerGenerator::new(client.clone()));

    let repository = Arc::new(SqliteKnowledgeRepository::new(db.pool().clone()));
    let retrieval = Arc::new(RetrievalOrchestrator::new(repository).with_embedder(client));

    let issues = Arc::new(SqliteIssueStore::new(db.pool().clone()));
    let logs = Arc::new(SqliteAutoReplyLogStore::new(db.pool().clone()));
    let groups = Arc::new(SqliteGroupConfigProvider::new(db.pool().clone()));

    let analyzer = ConversationAnalyzer::new(generator.clone());
    let engine = ReplyDecisionEngine::new(retrieval, generator, issues, logs.clone(), config.reply);
    let pipeline = AutoReplyPipeline::new(groups, logs, analyzer, engine);

    let mut message = InboundMessage::new(group, text);
    if let Some(customer) = customer {
        message = message.from_customer(customer);
    }
    if direct {
        message = message.direct();
    }

    let decision = pipeline.handle_message(&message, &[]).await;

    match &decision.reply {
        Some(reply) => {
            if !quiet {
                println!("Reply:");
            }
            println!("{}", reply);
        }
        None => {
            if !quiet {
                println!("No reply.");
            }
        }
    }
    if !quiet {
        if let Some(issue_id) = &decision.issue_id {
            println!("\nIssue tracked: {}", issue_id);
        }
        for q in &decision.questions {
            println!(
                "  question: {} (matched: {}, confidence: {})",
                q.question, q.matched, q.confidence
            );
        }
    }
    Ok(())
}

async fn cmd_issues(db: &Database, action: IssueAction, quiet: bool) -> anyhow::Result<()> {
    let store = SqliteIssueStore::new(db.pool().clone());

    match action {
        IssueAction::List {
            group_id,
            limit,
            status,
        } => {
            let issues = match status.as_deref() {
                Some(raw) => {
                    let status = IssueStatus::parse(raw)
                        .ok_or_else(|| anyhow::anyhow!("Unknown status '{}'", raw))?;
                    store
                        .list_by_status(status, limit)
                        .await?
                        .into_iter()
                        .filter(|i| i.group_id == group_id)
                        .collect()
                }
                None => store.list_by_group(&group_id, limit).await?,
            };

            if issues.is_empty() {
                if !quiet {
                    println!("No issues found.");
                }
            } else {
                for issue in issues {
                    println!(
                        "  {} [{}] {} ({})",
                        &issue.id[..8],
                        issue.status.as_str(),
                        issue.question_summary.lines().next().unwrap_or(""),
                        issue.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        IssueAction::Sweep => {
            let swept = store.mark_timed_out(chrono::Utc::now()).await?;
            if !quiet {
                println!("{} issue(s) timed out.", swept);
            }
        }
    }
    Ok(())
}

async fn cmd_doctor(db: &Database, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Deskbot Health Check");
        println!("====================");
        println!();
    }

    let mut all_ok = true;

    match Config::load() {
        Ok(config) => {
            println!("[OK] Configuration: Valid");
            match config.llm.resolved_api_key() {
                Ok(Some(_)) => {
                    let redacted = config.llm.redacted_api_key()?.unwrap_or_default();
                    println!("[OK] API Key: Configured ({})", redacted);
                }
                Ok(None) => {
                    all_ok = false;
                    println!("[!!] API Key: Not configured");
                    println!("     Set DESKBOT_API_KEY or OPENAI_API_KEY environment variable");
                }
                Err(e) => {
                    all_ok = false;
                    println!("[!!] API Key: Error - {}", e);
                }
            }
        }
        Err(e) => {
            all_ok = false;
            println!("[!!] Configuration: Error - {}", e);
        }
    }

    match db.health_check().await {
        Ok(()) => {
            println!("[OK] Database: Connected");
            println!("     Path: {}", db.path().display());
        }
        Err(e) => {
            all_ok = false;
            println!("[!!] Database: Health check failed - {}", e);
        }
    }

    println!();
    if all_ok {
        println!("All checks passed!");
    } else {
        println!("Some checks failed. See above for details.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_parses_flags() {
        let cli = Cli::parse_from([
            "deskbot", "process", "--group", "g1", "--customer", "c1", "--direct", "hello",
        ]);
        match cli.command {
            Commands::Process {
                group,
                text,
                customer,
                direct,
            } => {
                assert_eq!(group, "g1");
                assert_eq!(text, "hello");
                assert_eq!(customer.as_deref(), Some("c1"));
                assert!(direct);
            }
            _ => panic!("expected process command"),
        }
    }

    #[test]
    fn test_issues_sweep_parses() {
        let cli = Cli::parse_from(["deskbot", "--db", "/tmp/x.db", "issues", "sweep"]);
        assert!(cli.db.is_some());
        assert!(matches!(
            cli.command,
            Commands::Issues {
                action: IssueAction::Sweep
            }
        ));
    }
}
