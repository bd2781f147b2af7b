//! Model routing configuration.
//!
//! Maps `(step, tier)` to a concrete `{provider, model}` pair. The
//! scheduler resolves a task's route here, then validates the provider is
//! ready via the registry. Routing is configuration, not discovery: the
//! table is built once and only consulted at submit time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use prism_core::{defaults, ProviderTier, TaskStep};

/// Latency/quality class of a model, used to pick sensible defaults per
/// step. Matching and letter generation want deeper models than the
/// summarization steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Fast,
    Balanced,
    Deep,
}

/// Resolved routing target for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRoute {
    pub provider: String,
    pub model: String,
    pub kind: ModelKind,
}

impl ModelRoute {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            kind,
        }
    }
}

/// Step → tier → route table.
#[derive(Debug, Clone)]
pub struct ModelRoutes {
    routes: HashMap<(TaskStep, ProviderTier), ModelRoute>,
}

impl ModelRoutes {
    /// Empty table. Use [`ModelRoutes::defaults`] for the standard map.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Standard routing table.
    ///
    /// Free tier routes everything to the local Ollama provider. Paid
    /// tier uses a fast model for summarization and a deeper model for
    /// matching and letter generation.
    pub fn defaults() -> Self {
        let mut table = Self::new();

        for step in [
            TaskStep::SummarizeResume,
            TaskStep::SummarizeJob,
            TaskStep::Match,
            TaskStep::GenerateLetter,
        ] {
            table = table.with_route(
                step,
                ProviderTier::Free,
                ModelRoute::new("ollama", defaults::FREE_GEN_MODEL, ModelKind::Balanced),
            );
        }

        table
            .with_route(
                TaskStep::SummarizeResume,
                ProviderTier::Paid,
                ModelRoute::new("openai", defaults::PAID_GEN_MODEL, ModelKind::Fast),
            )
            .with_route(
                TaskStep::SummarizeJob,
                ProviderTier::Paid,
                ModelRoute::new("openai", defaults::PAID_GEN_MODEL, ModelKind::Fast),
            )
            .with_route(
                TaskStep::Match,
                ProviderTier::Paid,
                ModelRoute::new("openai", "gpt-4o", ModelKind::Deep),
            )
            .with_route(
                TaskStep::GenerateLetter,
                ProviderTier::Paid,
                ModelRoute::new("openai", "gpt-4o", ModelKind::Deep),
            )
    }

    /// Override or add one route.
    pub fn with_route(mut self, step: TaskStep, tier: ProviderTier, route: ModelRoute) -> Self {
        self.routes.insert((step, tier), route);
        self
    }

    /// Resolve the route for `(step, tier)`.
    pub fn resolve(&self, step: TaskStep, tier: ProviderTier) -> Option<&ModelRoute> {
        self.routes.get(&(step, tier))
    }
}

impl Default for ModelRoutes {
    fn default() -> Self {
        Self::defaults()
    }
}
