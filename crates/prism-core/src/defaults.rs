//! Centralized default constants for the prism routing layer.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.

use std::time::Duration;

// =============================================================================
// RETRY / BACKOFF
// =============================================================================

/// Default maximum retry count for failed task executions.
pub const TASK_MAX_RETRIES: u32 = 3;

/// Base backoff delay for the first retry, in milliseconds.
pub const BACKOFF_BASE_MS: u64 = 1000;

/// Ceiling on the exponential backoff delay, in milliseconds.
pub const BACKOFF_CAP_MS: u64 = 8000;

/// Exponential backoff delay before retry `attempt` (1-based).
///
/// `min(BACKOFF_BASE_MS * 2^(attempt-1), BACKOFF_CAP_MS)`: 1s, 2s, 4s, 8s, 8s, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    let ms = BACKOFF_BASE_MS
        .saturating_mul(1u64 << exp)
        .min(BACKOFF_CAP_MS);
    Duration::from_millis(ms)
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Number of queue wait-time samples kept per provider for the rolling
/// average served by queue status.
pub const WAIT_WINDOW_SAMPLES: usize = 100;

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Default global wall-clock deadline for a parallel fan-out batch (ms).
pub const ORCHESTRATOR_TIMEOUT_MS: u64 = 45_000;

// =============================================================================
// IDEMPOTENCY
// =============================================================================

/// Default idempotency record TTL in milliseconds (5 minutes).
///
/// Within this window a duplicate (owner, step, body) request is treated
/// as a replay and the handler is not invoked again.
pub const IDEMPOTENCY_TTL_MS: i64 = 300_000;

// =============================================================================
// CACHE
// =============================================================================

/// Maximum age accepted by BASIC-and-above validation, in seconds (24h).
/// A stale-but-unexpired entry older than this is treated as a miss.
pub const CACHE_MAX_AGE_SECS: i64 = 86_400;

// =============================================================================
// PROVIDERS
// =============================================================================

/// Default Ollama base URL (free tier, local).
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default OpenAI base URL (paid tier).
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default OpenRouter base URL.
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

/// Default model for the free tier.
pub const FREE_GEN_MODEL: &str = "llama3.1:8b";

/// Default model for the paid tier.
pub const PAID_GEN_MODEL: &str = "gpt-4o-mini";

/// Timeout for a single generation request in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Default concurrency ceiling for the local Ollama provider.
pub const OLLAMA_MAX_CONCURRENT: usize = 2;

/// Default concurrency ceiling for hosted API providers.
pub const HOSTED_MAX_CONCURRENT: usize = 8;

// =============================================================================
// REPAIR PIPELINE
// =============================================================================

/// Number of parsing strategies the repair pipeline may attempt.
pub const REPAIR_MAX_ATTEMPTS: usize = 4;
