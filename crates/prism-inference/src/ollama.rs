//! Ollama provider backend (free tier, local).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

use prism_core::{defaults, Error, LlmResponse, ProviderBackend, ProviderTier, Result, TokenUsage};

/// Ollama inference backend. Local, keyless, free tier.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    max_concurrency: usize,
}

impl OllamaBackend {
    /// Create a new Ollama backend with default settings.
    pub fn new() -> Self {
        Self::with_config(defaults::OLLAMA_URL.to_string(), defaults::GEN_TIMEOUT_SECS)
    }

    /// Create a new Ollama backend with custom configuration.
    pub fn with_config(base_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        info!(base_url = %base_url, timeout_secs, "Initializing Ollama backend");

        Self {
            client,
            base_url,
            max_concurrency: defaults::OLLAMA_MAX_CONCURRENT,
        }
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OLLAMA_BASE` | `http://127.0.0.1:11434` |
    /// | `OLLAMA_TIMEOUT_SECS` | `120` |
    /// | `OLLAMA_MAX_CONCURRENT` | `2` |
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        let timeout = std::env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::GEN_TIMEOUT_SECS);

        let mut backend = Self::with_config(base_url, timeout);
        if let Some(max) = std::env::var("OLLAMA_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            backend.max_concurrency = max.max(1);
        }
        backend
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Normalize a raw Ollama chat response body into an [`LlmResponse`].
pub fn parse_response(raw: &str) -> Result<LlmResponse> {
    let parsed: ChatResponse = serde_json::from_str(raw)
        .map_err(|e| Error::TypeSafety(format!("Unexpected Ollama response shape: {e}")))?;

    let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
        (None, None) => None,
        (p, c) => Some(TokenUsage::new(p.unwrap_or(0), c.unwrap_or(0))),
    };

    Ok(LlmResponse {
        content: parsed.message.content,
        usage,
    })
}

#[async_trait]
impl ProviderBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::Free
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn is_ready(&self) -> bool {
        // Local provider, no credentials to check.
        true
    }

    #[instrument(skip(self, prompt), fields(provider = "ollama", model = %model))]
    async fn invoke(&self, model: &str, prompt: &str) -> Result<LlmResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        debug!(prompt_len = prompt.len(), "Sending Ollama chat request");

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &body));
        }

        let raw = response.text().await?;
        parse_response(&raw)
    }
}

/// Map an HTTP error status to the error taxonomy.
pub(crate) fn classify_http_error(status: reqwest::StatusCode, body: &str) -> Error {
    let detail = format!("{}: {}", status, body.chars().take(200).collect::<String>());
    if status.as_u16() == 429 {
        Error::RateLimit(detail)
    } else if status.is_server_error() {
        Error::Provider(detail)
    } else {
        Error::InputValidation(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parse_response_extracts_content_and_usage() {
        let raw = r#"{
            "message": {"role": "assistant", "content": "hello"},
            "prompt_eval_count": 12,
            "eval_count": 7
        }"#;
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.usage, Some(TokenUsage::new(12, 7)));
    }

    #[test]
    fn parse_response_without_usage() {
        let raw = r#"{"message": {"role": "assistant", "content": "x"}}"#;
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.content, "x");
        assert!(resp.usage.is_none());
    }

    #[test]
    fn parse_response_bad_shape_is_type_safety_error() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, Error::TypeSafety(_)));
    }

    #[test]
    fn classify_429_as_rate_limit() {
        let err = classify_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, Error::RateLimit(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn classify_500_as_provider() {
        let err = classify_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, Error::Provider(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn classify_400_as_input_validation() {
        let err = classify_http_error(reqwest::StatusCode::BAD_REQUEST, "bad model");
        assert!(matches!(err, Error::InputValidation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn invoke_round_trip_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "{\"ok\":true}"},
                "prompt_eval_count": 5,
                "eval_count": 3
            })))
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), 5);
        let resp = backend.invoke("llama3.1:8b", "ping").await.unwrap();
        assert_eq!(resp.content, "{\"ok\":true}");
        assert_eq!(resp.usage.unwrap().total_tokens(), 8);
    }

    #[tokio::test]
    async fn invoke_maps_rate_limit_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(429).set_body_string("too many"))
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), 5);
        let err = backend.invoke("llama3.1:8b", "ping").await.unwrap_err();
        assert!(matches!(err, Error::RateLimit(_)));
    }
}
