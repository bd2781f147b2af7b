//! Shared data models for the prism routing layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::ErrorCategory;

// =============================================================================
// STEPS AND TIERS
// =============================================================================

/// Logical generation step a task performs.
///
/// Steps are the routing unit: model routing maps each step to a concrete
/// `{provider, model}` pair per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStep {
    SummarizeResume,
    SummarizeJob,
    Match,
    GenerateLetter,
}

impl TaskStep {
    /// Stable string form, used in idempotency keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SummarizeResume => "summarize_resume",
            Self::SummarizeJob => "summarize_job",
            Self::Match => "match",
            Self::GenerateLetter => "generate_letter",
        }
    }
}

impl std::fmt::Display for TaskStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cost/quality class of a provider, used to pick default models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Free,
    Paid,
}

impl std::fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Paid => write!(f, "paid"),
        }
    }
}

// =============================================================================
// TASK
// =============================================================================

/// A unit of generation work submitted to the scheduler.
///
/// Owned exclusively by the queue it is enqueued into; removed on dispatch.
/// Never mutated after creation except `retry_count` during retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Caller identity, used for idempotency keys and usage accounting.
    pub owner_id: String,
    /// Correlation id propagated through logs across the request.
    pub correlation_id: Uuid,
    pub step: TaskStep,
    /// Step input. If it contains a string `prompt` field that string is
    /// sent to the provider verbatim; otherwise the whole payload is
    /// serialized as the prompt.
    pub payload: JsonValue,
    /// Higher dispatches first within one provider's queue.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Task {
    /// Create a task with default priority and retry budget.
    pub fn new(owner_id: impl Into<String>, step: TaskStep, payload: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            correlation_id: Uuid::new_v4(),
            step,
            payload,
            priority: 0,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries: crate::defaults::TASK_MAX_RETRIES,
        }
    }

    /// Set the queue priority (higher dispatches first).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Propagate an existing correlation id instead of minting one.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// The prompt text sent to the provider.
    pub fn prompt(&self) -> String {
        match self.payload.get("prompt").and_then(|p| p.as_str()) {
            Some(p) => p.to_string(),
            None => self.payload.to_string(),
        }
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Token accounting for one provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Normalized response from a provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Raw text content as emitted by the model.
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Terminal outcome of one task. Immutable; the last one produced for a
/// task id is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub success: bool,
    /// Raw model output on success. Feed to the repair pipeline.
    pub raw_content: Option<String>,
    pub usage: Option<TokenUsage>,
    /// Internal error description on failure. Never user-facing.
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub duration_ms: u64,
    pub provider_name: String,
    pub model_name: String,
}

impl TaskResult {
    /// Build a success result from a provider response.
    pub fn succeeded(
        task_id: Uuid,
        response: LlmResponse,
        duration_ms: u64,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            success: true,
            raw_content: Some(response.content),
            usage: response.usage,
            error: None,
            error_category: None,
            duration_ms,
            provider_name: provider_name.into(),
            model_name: model_name.into(),
        }
    }

    /// Build a terminal failure result from the last error.
    pub fn failed(
        task_id: Uuid,
        error: &crate::error::Error,
        duration_ms: u64,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            success: false,
            raw_content: None,
            usage: None,
            error: Some(error.to_string()),
            error_category: Some(error.category()),
            duration_ms,
            provider_name: provider_name.into(),
            model_name: model_name.into(),
        }
    }
}

// =============================================================================
// IDEMPOTENCY
// =============================================================================

/// Record asserting that a logical execution for `key` is underway or
/// recently completed. At most one non-expired record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub owner_id: String,
    pub step: TaskStep,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: i64,
}

impl IdempotencyRecord {
    /// Whether this record has logically expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.created_at + chrono::Duration::milliseconds(self.ttl_ms)
    }
}
