//! Per-provider worker pools for LLM generation tasks.
//!
//! Tasks are queued per provider (priority first, FIFO among equals),
//! executed under the provider's concurrency ceiling, and retried with
//! capped exponential backoff. Submission is a single awaitable that
//! resolves at the terminal result.

mod queue;
pub mod scheduler;

pub use scheduler::{QueueStatus, RetryPolicy, Scheduler, SchedulerBuilder};
