//! Fan-out orchestration of generation steps.
//!
//! Each step goes through the scheduler under one global deadline, then
//! its raw output goes through the repair pipeline. A terminal provider
//! failure surfaces as a failed outcome directly; when the provider
//! succeeded but the pipeline cannot parse its output, rule-based
//! extraction produces a degraded result, and only when that too finds
//! nothing usable does the step fail.

use futures::future::join_all;
use prism_core::defaults::ORCHESTRATOR_TIMEOUT_MS;
use prism_core::{ErrorCategory, ProviderTier, Task, TaskStep};
use prism_jobs::Scheduler;
use prism_repair::{ExpectedField, ValidateOptions, ValidationResult};
use serde_json::Value as JsonValue;
use tokio::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::fallback;

/// One step to run: the task, which provider tier pays for it, and the
/// shape its output is normalized toward.
pub struct StepRequest {
    pub task: Task,
    pub tier: ProviderTier,
    pub expected: Vec<ExpectedField>,
}

impl StepRequest {
    pub fn new(task: Task, tier: ProviderTier) -> Self {
        Self {
            task,
            tier,
            expected: Vec::new(),
        }
    }

    pub fn with_expected(mut self, expected: Vec<ExpectedField>) -> Self {
        self.expected = expected;
        self
    }
}

/// Terminal outcome of one step, safe to hand to request-facing code.
///
/// `user_message` is a stable category-derived sentence; raw provider and
/// parser text never appears here, only in logs keyed by correlation id.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub task_id: Uuid,
    pub step: TaskStep,
    pub correlation_id: Uuid,
    pub success: bool,
    pub data: Option<JsonValue>,
    pub warnings: Vec<String>,
    /// Data came from a lower-confidence path: heuristic syntax repair or
    /// rule-based extraction.
    pub fallback_used: bool,
    pub error_category: Option<ErrorCategory>,
    pub user_message: Option<&'static str>,
}

impl StepOutcome {
    fn failure(
        task_id: Uuid,
        step: TaskStep,
        correlation_id: Uuid,
        category: ErrorCategory,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            task_id,
            step,
            correlation_id,
            success: false,
            data: None,
            warnings,
            fallback_used: false,
            error_category: Some(category),
            user_message: Some(category.user_message()),
        }
    }
}

/// Runs batches of steps against the scheduler under one wall-clock
/// deadline and turns raw results into structured outcomes.
pub struct Orchestrator {
    scheduler: Scheduler,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            timeout: Duration::from_millis(ORCHESTRATOR_TIMEOUT_MS),
        }
    }

    /// Global deadline applied to every step in a batch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run independent steps in parallel. Outcomes come back in request
    /// order; one step failing never aborts its siblings.
    pub async fn run_parallel(&self, requests: Vec<StepRequest>) -> Vec<StepOutcome> {
        join_all(requests.into_iter().map(|r| self.run_step(r))).await
    }

    /// Run one step to a terminal outcome.
    pub async fn run_step(&self, request: StepRequest) -> StepOutcome {
        let StepRequest {
            task,
            tier,
            expected,
        } = request;
        let task_id = task.id;
        let step = task.step;
        let correlation_id = task.correlation_id;

        let result = match self
            .scheduler
            .submit_with_deadline(task, tier, self.timeout)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    task_id = %task_id,
                    step = %step,
                    error = %e,
                    error_category = %e.category(),
                    "Step could not be scheduled"
                );
                return StepOutcome::failure(task_id, step, correlation_id, e.category(), Vec::new());
            }
        };

        if !result.success {
            let category = result.error_category.unwrap_or(ErrorCategory::Unknown);
            warn!(
                correlation_id = %correlation_id,
                task_id = %task_id,
                step = %step,
                provider = %result.provider_name,
                error = result.error.as_deref().unwrap_or("unknown"),
                error_category = %category,
                "Step failed terminally"
            );
            return StepOutcome::failure(task_id, step, correlation_id, category, Vec::new());
        }

        let raw = result.raw_content.unwrap_or_default();
        let options = ValidateOptions::default().with_expected(expected);
        match prism_repair::validate(&raw, &options) {
            ValidationResult::Success {
                data,
                strategy,
                warnings,
                fallback_used,
                ..
            } => {
                debug!(
                    correlation_id = %correlation_id,
                    task_id = %task_id,
                    step = %step,
                    parse_strategy = strategy.as_str(),
                    fallback_used,
                    "Step completed"
                );
                StepOutcome {
                    task_id,
                    step,
                    correlation_id,
                    success: true,
                    data: Some(data),
                    warnings,
                    fallback_used,
                    error_category: None,
                    user_message: None,
                }
            }
            ValidationResult::Failure {
                error,
                mut warnings,
                ..
            } => {
                warn!(
                    correlation_id = %correlation_id,
                    task_id = %task_id,
                    step = %step,
                    error = %error,
                    "Repair pipeline exhausted, trying rule-based extraction"
                );
                match fallback::extract(step, &raw) {
                    Some(data) => {
                        warnings.push("structured parse failed; rule-based extraction used".to_string());
                        StepOutcome {
                            task_id,
                            step,
                            correlation_id,
                            success: true,
                            data: Some(data),
                            warnings,
                            fallback_used: true,
                            error_category: None,
                            user_message: None,
                        }
                    }
                    None => StepOutcome::failure(
                        task_id,
                        step,
                        correlation_id,
                        ErrorCategory::Parse,
                        warnings,
                    ),
                }
            }
        }
    }
}
