//! # prism-inference
//!
//! LLM provider backends and registry for the prism routing layer.
//!
//! This crate provides:
//! - The provider registry with tier-based preference ([`ProviderRegistry`])
//! - Model routing configuration ([`ModelRoutes`])
//! - Concrete HTTP backends: Ollama (free/local) and OpenAI-compatible
//!   (OpenAI, OpenRouter)
//! - A mock backend with controllable latency and scripted failures for
//!   deterministic tests

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod routes;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use registry::ProviderRegistry;
pub use routes::{ModelKind, ModelRoute, ModelRoutes};
