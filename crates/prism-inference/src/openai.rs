//! OpenAI-compatible provider backend (paid tier).
//!
//! Serves both OpenAI and OpenRouter; the two differ only in base URL,
//! credentials, and the attribution headers OpenRouter accepts.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use prism_core::{defaults, Error, LlmResponse, ProviderBackend, ProviderTier, Result, TokenUsage};

use crate::ollama::classify_http_error;

/// Configuration for an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Provider identity ("openai" or "openrouter").
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
    /// OpenRouter-specific: HTTP-Referer header for rankings.
    pub http_referer: Option<String>,
    /// OpenRouter-specific: X-Title header for app name.
    pub x_title: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            base_url: defaults::OPENAI_URL.to_string(),
            api_key: None,
            timeout_secs: defaults::GEN_TIMEOUT_SECS,
            max_concurrency: defaults::HOSTED_MAX_CONCURRENT,
            http_referer: None,
            x_title: None,
        }
    }
}

/// OpenAI-compatible chat completions backend.
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Create a backend from explicit configuration.
    pub fn new(config: OpenAiConfig) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(ref referer) = config.http_referer {
            if let Ok(v) = HeaderValue::from_str(referer) {
                headers.insert("HTTP-Referer", v);
            }
        }
        if let Some(ref title) = config.x_title {
            if let Ok(v) = HeaderValue::from_str(title) {
                headers.insert("X-Title", v);
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        info!(
            provider = %config.name,
            base_url = %config.base_url,
            has_key = config.api_key.is_some(),
            "Initializing OpenAI-compatible backend"
        );

        Self { client, config }
    }

    /// OpenAI backend from `OPENAI_API_KEY` / `OPENAI_BASE_URL` /
    /// `OPENAI_TIMEOUT_SECS`.
    pub fn openai_from_env() -> Self {
        Self::new(OpenAiConfig {
            name: "openai".to_string(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| defaults::OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout_secs: std::env::var("OPENAI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::GEN_TIMEOUT_SECS),
            ..Default::default()
        })
    }

    /// OpenRouter backend from `OPENROUTER_API_KEY` and friends.
    pub fn openrouter_from_env() -> Self {
        Self::new(OpenAiConfig {
            name: "openrouter".to_string(),
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| defaults::OPENROUTER_URL.to_string()),
            api_key: std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            http_referer: std::env::var("OPENROUTER_HTTP_REFERER").ok(),
            x_title: std::env::var("OPENROUTER_X_TITLE").ok(),
            ..Default::default()
        })
    }
}

#[derive(Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionsResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Normalize a raw chat completions body into an [`LlmResponse`].
pub fn parse_response(raw: &str) -> Result<LlmResponse> {
    let parsed: CompletionsResponse = serde_json::from_str(raw)
        .map_err(|e| Error::TypeSafety(format!("Unexpected completions response shape: {e}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::TypeSafety("Completions response had no choices".to_string()))?;

    Ok(LlmResponse {
        content,
        usage: parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
    })
}

#[async_trait]
impl ProviderBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::Paid
    }

    fn max_concurrency(&self) -> usize {
        self.config.max_concurrency
    }

    fn is_ready(&self) -> bool {
        self.config.api_key.is_some()
    }

    #[instrument(skip(self, prompt), fields(provider = %self.config.name, model = %model))]
    async fn invoke(&self, model: &str, prompt: &str) -> Result<LlmResponse> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            warn!(provider = %self.config.name, "Invoke on backend with no API key");
            Error::Config(format!("{}: missing API key", self.config.name))
        })?;

        let url = format!("{}/chat/completions", self.config.base_url);
        let request = CompletionsRequest {
            model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        debug!(prompt_len = prompt.len(), "Sending completions request");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &body));
        }

        let raw = response.text().await?;
        parse_response(&raw)
    }
}
