//! # prism-core
//!
//! Core types, traits, and abstractions for the prism routing layer.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other prism crates depend on: the error taxonomy
//! driving retry decisions, task and result models, and the narrow
//! collaborator interfaces (provider backends, cache store, idempotency
//! store, usage sink).

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorCategory, Result};
pub use models::{
    IdempotencyRecord, LlmResponse, ProviderTier, Task, TaskResult, TaskStep,
    TokenUsage,
};
pub use traits::{CacheStore, IdempotencyStore, NoOpUsageSink, ProviderBackend, UsageSink};
