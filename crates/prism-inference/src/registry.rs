//! Provider registry with tier-based preference.
//!
//! Holds the set of available model providers and answers "which ready
//! provider should handle this tier". Built once at process start; the
//! only runtime-mutable provider state is readiness, which a backend may
//! report as false when its credentials are absent.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use prism_core::{ProviderBackend, ProviderTier};

/// Deterministic preference order for the paid tier.
const PAID_PREFERENCE: &[&str] = &["openai", "openrouter"];

/// Deterministic preference order for the free tier.
const FREE_PREFERENCE: &[&str] = &["ollama"];

/// Registry of configured providers.
///
/// Lookup never fails loudly: a missing or not-ready provider yields
/// `None`, which callers must treat as a terminal, non-retryable condition
/// for that request.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderBackend>>,
    /// Registration order, for deterministic fallback when no preferred
    /// provider is ready.
    order: Vec<String>,
}

impl ProviderRegistry {
    /// Create a new empty provider registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a provider. Re-registering a name replaces the backend
    /// but keeps its original position in the fallback order.
    pub fn register(&mut self, backend: Arc<dyn ProviderBackend>) {
        let name = backend.name().to_string();
        info!(
            provider = %name,
            tier = %backend.tier(),
            max_concurrency = backend.max_concurrency(),
            ready = backend.is_ready(),
            "Registering provider"
        );
        if !self.providers.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.providers.insert(name, backend);
    }

    /// Get a provider by name, ready or not.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderBackend>> {
        self.providers.get(name).cloned()
    }

    /// All registered provider names in registration order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Ready providers, optionally filtered to one tier.
    pub fn list_available(&self, tier: Option<ProviderTier>) -> Vec<Arc<dyn ProviderBackend>> {
        self.order
            .iter()
            .filter_map(|name| self.providers.get(name))
            .filter(|p| p.is_ready())
            .filter(|p| tier.map_or(true, |t| p.tier() == t))
            .cloned()
            .collect()
    }

    /// The preferred ready provider for a tier.
    ///
    /// Walks the tier's fixed preference order first, then falls back to
    /// the first available provider of that tier. Returns `None` when no
    /// provider of the tier is ready.
    pub fn preferred(&self, tier: ProviderTier) -> Option<Arc<dyn ProviderBackend>> {
        let preference = match tier {
            ProviderTier::Paid => PAID_PREFERENCE,
            ProviderTier::Free => FREE_PREFERENCE,
        };

        for name in preference {
            if let Some(p) = self.providers.get(*name) {
                if p.is_ready() && p.tier() == tier {
                    debug!(provider = %name, tier = %tier, "Preferred provider selected");
                    return Some(p.clone());
                }
            }
        }

        let fallback = self.list_available(Some(tier)).into_iter().next();
        if let Some(ref p) = fallback {
            debug!(provider = %p.name(), tier = %tier, "Preference miss, using first available");
        }
        fallback
    }

    /// Build a registry from environment variables.
    ///
    /// Ollama (free tier) is always registered. OpenAI and OpenRouter are
    /// registered when their API keys are configured; a backend built
    /// without a key reports not-ready rather than being omitted, so
    /// readiness can be observed.
    pub fn from_env() -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(crate::OllamaBackend::from_env()));

        if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
            registry.register(Arc::new(crate::OpenAiBackend::openai_from_env()));
        }
        if std::env::var("OPENROUTER_API_KEY").is_ok_and(|k| !k.is_empty()) {
            registry.register(Arc::new(crate::OpenAiBackend::openrouter_from_env()));
        }

        info!(
            providers = ?registry.provider_names(),
            "Provider registry initialized from environment"
        );

        registry
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
