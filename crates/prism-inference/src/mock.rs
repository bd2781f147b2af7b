//! Mock provider backend for deterministic testing.
//!
//! Used by scheduler and orchestrator tests to control latency, script
//! failures, and observe the concurrency the scheduler actually applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use prism_core::{Error, ErrorCategory, LlmResponse, ProviderBackend, ProviderTier, Result, TokenUsage};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: String,
    pub prompt: String,
}

struct MockState {
    /// Invocations remaining that should fail before calls start
    /// succeeding.
    fail_remaining: AtomicUsize,
    fail_category: ErrorCategory,
    current_active: AtomicUsize,
    max_observed_active: AtomicUsize,
    call_log: Mutex<Vec<MockCall>>,
}

/// Mock provider backend.
#[derive(Clone)]
pub struct MockBackend {
    name: String,
    tier: ProviderTier,
    max_concurrency: usize,
    ready: bool,
    latency: Duration,
    default_response: String,
    response_map: HashMap<String, String>,
    usage: Option<TokenUsage>,
    state: Arc<MockState>,
}

impl MockBackend {
    /// Create a ready free-tier mock with no latency.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier: ProviderTier::Free,
            max_concurrency: 4,
            ready: true,
            latency: Duration::ZERO,
            default_response: "{}".to_string(),
            response_map: HashMap::new(),
            usage: Some(TokenUsage::new(10, 5)),
            state: Arc::new(MockState {
                fail_remaining: AtomicUsize::new(0),
                fail_category: ErrorCategory::Provider,
                current_active: AtomicUsize::new(0),
                max_observed_active: AtomicUsize::new(0),
                call_log: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_tier(mut self, tier: ProviderTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// Simulated provider latency per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fixed response returned for any prompt without a mapping.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Response returned for one specific prompt.
    pub fn with_response_for(
        mut self,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.response_map.insert(prompt.into(), response.into());
        self
    }

    /// Omit token usage from responses.
    pub fn without_usage(mut self) -> Self {
        self.usage = None;
        self
    }

    /// Fail the first `count` invocations with `category`, then succeed.
    /// `count = usize::MAX` makes the backend always fail.
    pub fn failing(self, count: usize, category: ErrorCategory) -> Self {
        let state = Arc::new(MockState {
            fail_remaining: AtomicUsize::new(count),
            fail_category: category,
            current_active: AtomicUsize::new(0),
            max_observed_active: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
        });
        Self { state, ..self }
    }

    /// All recorded invocations.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.call_log.lock().unwrap().clone()
    }

    /// Number of invocations so far.
    pub fn call_count(&self) -> usize {
        self.state.call_log.lock().unwrap().len()
    }

    /// Highest number of concurrently in-flight invocations observed.
    pub fn max_observed_active(&self) -> usize {
        self.state.max_observed_active.load(Ordering::SeqCst)
    }

    fn make_error(&self) -> Error {
        let msg = format!("scripted failure from {}", self.name);
        match self.state.fail_category {
            ErrorCategory::Network => Error::Network(msg),
            ErrorCategory::Timeout => Error::Timeout(msg),
            ErrorCategory::RateLimit => Error::RateLimit(msg),
            ErrorCategory::Provider => Error::Provider(msg),
            ErrorCategory::Parse => Error::Parse(msg),
            ErrorCategory::TypeSafety => Error::TypeSafety(msg),
            ErrorCategory::InputValidation => Error::InputValidation(msg),
            ErrorCategory::Unknown => Error::Internal(msg),
        }
    }
}

#[async_trait]
impl ProviderBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> ProviderTier {
        self.tier
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn invoke(&self, model: &str, prompt: &str) -> Result<LlmResponse> {
        self.state.call_log.lock().unwrap().push(MockCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
        });

        let active = self.state.current_active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_observed_active
            .fetch_max(active, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.state.current_active.fetch_sub(1, Ordering::SeqCst);

        let remaining = self.state.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.state.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(self.make_error());
        }

        let content = self
            .response_map
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| self.default_response.clone());

        Ok(LlmResponse {
            content,
            usage: self.usage,
        })
    }
}
