//! Orchestration of parallel generation steps.
//!
//! Ties the scheduler, repair pipeline, and rule-based fallback together:
//! a batch of independent steps runs under one global deadline, every raw
//! result is parsed through the repair pipeline, and a step only fails
//! outright when neither the provider nor extraction produced anything.

pub mod fallback;
pub mod orchestrator;

pub use orchestrator::{Orchestrator, StepOutcome, StepRequest};
