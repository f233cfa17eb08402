//! HTTP client for OpenAI-compatible chat and embedding endpoints

use std::time::Duration;

use reqwest::Client as HttpClient;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::token::CachedToken;
use super::types::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Message};

/// Default request timeout; generator calls are the only slow operation in
/// the pipeline and are bounded here
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Thread-safe client for chat completion and embedding requests
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    credential: CachedToken,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

/// Builder for creating an LlmClient
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

impl Default for LlmClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            api_key: None,
            timeout_secs: None,
        }
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let config = self
            .config
            .unwrap_or_else(|| crate::config::Config::default().llm);
        let api_key = self
            .api_key
            .ok_or_else(|| Error::Config("API key is required".to_string()))?;

        let timeout_secs = self
            .timeout_secs
            .unwrap_or(if config.timeout_secs > 0 {
                config.timeout_secs
            } else {
                DEFAULT_TIMEOUT_SECS
            });

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::Network)?;

        // Plain API keys never expire; providers that exchange credentials
        // for short-lived tokens swap this for a refreshing CachedToken.
        Ok(LlmClient {
            http_client,
            config,
            credential: CachedToken::permanent(api_key),
        })
    }
}

impl LlmClient {
    /// Create a new client with the given configuration and API key
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::new()
            .config(config)
            .api_key(api_key)
            .build()
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    /// The configured chat model
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Make a chat completion request and return the first choice's content
    pub async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatRequest::new(&self.config.model, messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.credential.token())
            .json(&request)
            .send()
            .await
            .map_err(Error::Network)?;

        let status = response.status();
        if !status.is_success() {
            return self.handle_error_response(status, response).await;
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Generator(format!("Failed to parse response: {}", e)))?;

        chat_response
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| Error::Generator("Empty response from API".to_string()))
    }

    /// Generate an embedding for a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest::new(&self.config.embedding_model, text);
        let url = format!("{}/embeddings", self.config.base_url);
        debug!(model = %request.model, "Sending embedding request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.credential.token())
            .json(&request)
            .send()
            .await
            .map_err(Error::Network)?;

        let status = response.status();
        if !status.is_success() {
            return self.handle_error_response(status, response).await;
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        embedding_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("Empty embedding response".to_string()))
    }

    /// Map error responses from the API to typed errors
    async fn handle_error_response<T>(
        &self,
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> Result<T> {
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(Error::Generator(
                "Unauthorized: invalid API key. Set DESKBOT_API_KEY.".to_string(),
            )),
            429 => {
                let wait_secs = extract_retry_after(&body).unwrap_or(60);
                Err(Error::RateLimited(wait_secs))
            }
            400 => Err(Error::Generator(format!("Bad request: {}", body))),
            404 => Err(Error::Generator(format!(
                "Model not found or endpoint unavailable: {}",
                body
            ))),
            500..=599 => Err(Error::Generator(format!(
                "Server error ({}): {}",
                status, body
            ))),
            _ => Err(Error::Generator(format!("HTTP error {}: {}", status, body))),
        }
    }
}

/// Extract retry-after value from an error response body
fn extract_retry_after(body: &str) -> Option<u64> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(retry_after) = json.get("retry_after").and_then(|v| v.as_u64()) {
        return Some(retry_after);
    }
    json.get("error")
        .and_then(|e| e.get("retry_after"))
        .and_then(|v| v.as_u64())
}
