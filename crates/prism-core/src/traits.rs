//! Core traits for prism abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability. The scheduler,
//! cache layer, and idempotency guard only ever see these shapes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{IdempotencyRecord, LlmResponse, ProviderTier, TokenUsage};

// =============================================================================
// PROVIDER BACKEND
// =============================================================================

/// An external LLM API endpoint plus its readiness/tier metadata.
///
/// `invoke` is the only network call the core makes; implementations wrap
/// one HTTP API each and normalize its response shape.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Stable provider name ("ollama", "openai", "openrouter").
    fn name(&self) -> &str;

    /// Cost/quality tier this provider belongs to.
    fn tier(&self) -> ProviderTier;

    /// Per-provider concurrency ceiling enforced by the scheduler.
    fn max_concurrency(&self) -> usize;

    /// Whether the provider can currently accept requests. May flip to
    /// false when credentials are absent.
    fn is_ready(&self) -> bool;

    /// Execute one generation call against `model` with `prompt`.
    async fn invoke(&self, model: &str, prompt: &str) -> Result<LlmResponse>;
}

// =============================================================================
// CACHE STORE
// =============================================================================

/// Key-value store behind the cache/validation layer.
///
/// Backed by a remote store in production or an in-process map fallback
/// when the remote store is unavailable.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

// =============================================================================
// IDEMPOTENCY STORE
// =============================================================================

/// Persistence behind the idempotency guard.
///
/// `create_if_absent` must be atomic: when two callers race, exactly one
/// creation succeeds and the other observes `false`.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Insert `record` unless a non-expired record already exists for its
    /// key. Returns whether the insert won.
    async fn create_if_absent(&self, record: IdempotencyRecord) -> Result<bool>;

    /// Fetch the current record for `key`, expired or not.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>>;
}

// =============================================================================
// USAGE SINK
// =============================================================================

/// Token-usage telemetry consumer.
///
/// Called fire-and-forget after each successful task; failures are logged
/// and never fail the task.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record_usage(
        &self,
        task_id: Uuid,
        usage: &TokenUsage,
        provider: &str,
        model: &str,
    ) -> Result<()>;
}

/// Usage sink that discards telemetry. Default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpUsageSink;

#[async_trait]
impl UsageSink for NoOpUsageSink {
    async fn record_usage(
        &self,
        _task_id: Uuid,
        _usage: &TokenUsage,
        _provider: &str,
        _model: &str,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_usage_sink() {
        let sink = NoOpUsageSink;
        let result = sink
            .record_usage(Uuid::new_v4(), &TokenUsage::new(1, 2), "ollama", "m")
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_traits_are_object_safe() {
        fn assert_object_safe(
            _a: Option<&dyn ProviderBackend>,
            _b: Option<&dyn CacheStore>,
            _c: Option<&dyn IdempotencyStore>,
            _d: Option<&dyn UsageSink>,
        ) {
        }
        assert_object_safe(None, None, None, None);
    }
}
