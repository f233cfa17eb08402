//! Configuration management with file persistence

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Deskbot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub reply: ReplyConfig,
}

/// LLM provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Provider name used for logging and token exchange selection
    pub provider: String,
    /// OpenAI-compatible API base URL
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

/// Defaults applied when a group has no stored configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// Minimum 0-100 score to treat a match or question as actionable
    pub confidence_threshold: u8,
    /// Minutes before an unanswered issue times out
    pub issue_timeout_minutes: i64,
    /// Sent when the bot must reply but has no answer
    pub fallback_message: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: None,
                provider: "openai".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                temperature: 0.3,
                max_tokens: 1024,
                timeout_secs: 30,
            },
            reply: ReplyConfig {
                confidence_threshold: 60,
                issue_timeout_minutes: 15,
                fallback_message:
                    "抱歉，這個問題我目前無法回答，已為您轉交客服人員處理。".to_string(),
            },
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the environment
    ///
    /// Keys are never stored in the configuration file.
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("DESKBOT_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok())
    }

    /// Redacted key for display in diagnostics
    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| {
            opt.map(|key| {
                if key.len() <= 4 {
                    "***".to_string()
                } else {
                    format!("***{}", &key[key.len() - 4..])
                }
            })
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("DESKBOT_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("deskbot")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.llm.enforce_env_only()?;
        Ok(config)
    }

    /// Persist configuration to disk
    pub fn save(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let path = Self::config_path()?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
