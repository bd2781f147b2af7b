//! Task scheduler: one worker pool per provider, bounded retry, awaitable
//! completion.
//!
//! Each provider owns a priority queue and an active count capped at the
//! provider's concurrency ceiling. The dispatch loop is re-entrant: it
//! runs on every enqueue and every completion, so the pool drains without
//! a dedicated poller. `submit` resolves only at a terminal result.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use prism_core::defaults::{backoff_delay, WAIT_WINDOW_SAMPLES};
use prism_core::{
    Error, NoOpUsageSink, ProviderBackend, ProviderTier, Result, Task, TaskResult, UsageSink,
};
use prism_inference::{ModelRoutes, ProviderRegistry};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{sleep, timeout_at, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::queue::{ProviderQueue, QueuedTask};

/// What happens to a task between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// The task keeps its worker slot and sleeps through the backoff.
    /// Bounds worst-case latency: a retrying task is never overtaken by
    /// newly queued higher-priority work.
    #[default]
    InPlace,
    /// The task releases its slot during backoff and re-enters the queue
    /// at the back of its priority class. Fairer under contention, at the
    /// cost of unbounded overtaking.
    Requeue,
}

/// Point-in-time view of one provider's pool.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub active: usize,
    /// Mean queue wait over the last [`WAIT_WINDOW_SAMPLES`] dispatches.
    pub avg_wait_ms: u64,
    pub max_concurrency: usize,
}

struct ProviderState {
    queue: ProviderQueue,
    active: usize,
    ceiling: usize,
    wait_samples: VecDeque<u64>,
}

impl ProviderState {
    fn new(ceiling: usize) -> Self {
        Self {
            queue: ProviderQueue::new(),
            active: 0,
            ceiling: ceiling.max(1),
            wait_samples: VecDeque::with_capacity(WAIT_WINDOW_SAMPLES),
        }
    }

    fn record_wait(&mut self, waited: Duration) {
        if self.wait_samples.len() == WAIT_WINDOW_SAMPLES {
            self.wait_samples.pop_front();
        }
        self.wait_samples.push_back(waited.as_millis() as u64);
    }

    fn avg_wait_ms(&self) -> u64 {
        if self.wait_samples.is_empty() {
            return 0;
        }
        self.wait_samples.iter().sum::<u64>() / self.wait_samples.len() as u64
    }
}

struct Inner {
    registry: ProviderRegistry,
    routes: ModelRoutes,
    usage_sink: Arc<dyn UsageSink>,
    retry_policy: RetryPolicy,
    states: Mutex<HashMap<String, ProviderState>>,
    seq: AtomicU64,
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    registry: ProviderRegistry,
    routes: ModelRoutes,
    usage_sink: Arc<dyn UsageSink>,
    retry_policy: RetryPolicy,
}

impl SchedulerBuilder {
    pub fn routes(mut self, routes: ModelRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage_sink = sink;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            inner: Arc::new(Inner {
                registry: self.registry,
                routes: self.routes,
                usage_sink: self.usage_sink,
                retry_policy: self.retry_policy,
                states: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
            }),
        }
    }
}

/// Cheap to clone; all clones share the same pools.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Scheduler with default routes, no usage sink, in-place retry.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: ProviderRegistry) -> SchedulerBuilder {
        SchedulerBuilder {
            registry,
            routes: ModelRoutes::defaults(),
            usage_sink: Arc::new(NoOpUsageSink),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Submit a task and await its terminal result.
    ///
    /// `Ok(result)` covers both success and terminal task failure; `Err`
    /// means the task never entered a pool (no route, or the routed
    /// provider is not available).
    pub async fn submit(&self, task: Task, tier: ProviderTier) -> Result<TaskResult> {
        self.submit_inner(task, tier, None).await
    }

    /// Like [`Scheduler::submit`], with an absolute deadline measured from
    /// now. The deadline bounds every attempt and every backoff sleep;
    /// an in-flight provider call is cancelled when it fires.
    pub async fn submit_with_deadline(
        &self,
        task: Task,
        tier: ProviderTier,
        deadline: Duration,
    ) -> Result<TaskResult> {
        self.submit_inner(task, tier, Some(Instant::now() + deadline))
            .await
    }

    async fn submit_inner(
        &self,
        task: Task,
        tier: ProviderTier,
        deadline: Option<Instant>,
    ) -> Result<TaskResult> {
        let route = self
            .inner
            .routes
            .resolve(task.step, tier)
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!("no model route for step {} on tier {}", task.step, tier))
            })?;

        let provider = self
            .inner
            .registry
            .get(&route.provider)
            .filter(|p| p.is_ready())
            .ok_or_else(|| {
                Error::Config(format!("provider {} is not available", route.provider))
            })?;

        let (tx, rx) = oneshot::channel();
        let queued = QueuedTask {
            seq: self.inner.seq.fetch_add(1, Ordering::Relaxed),
            enqueued_at: Instant::now(),
            deadline,
            completion: tx,
            route,
            task,
        };

        {
            let mut states = self.inner.states.lock().await;
            let state = states
                .entry(provider.name().to_string())
                .or_insert_with(|| ProviderState::new(provider.max_concurrency()));
            debug!(
                task_id = %queued.task.id,
                correlation_id = %queued.task.correlation_id,
                step = %queued.task.step,
                provider = provider.name(),
                model = %queued.route.model,
                priority = queued.task.priority,
                queue_depth = state.queue.len() + 1,
                "Task enqueued"
            );
            state.queue.push(queued);
        }
        Self::dispatch(self.inner.clone(), provider);

        rx.await
            .map_err(|_| Error::Internal("task completion channel closed".to_string()))
    }

    /// Zero-based dispatch position of a waiting task, across all pools.
    /// `None` once the task is running or finished.
    pub async fn queue_position(&self, task_id: Uuid) -> Option<usize> {
        let states = self.inner.states.lock().await;
        states.values().find_map(|s| s.queue.position(task_id))
    }

    /// Pool statistics for one provider. `None` until the provider has
    /// seen its first task.
    pub async fn status(&self, provider: &str) -> Option<QueueStatus> {
        let states = self.inner.states.lock().await;
        states.get(provider).map(|s| QueueStatus {
            pending: s.queue.len(),
            active: s.active,
            avg_wait_ms: s.avg_wait_ms(),
            max_concurrency: s.ceiling,
        })
    }

    /// Pop and run tasks while the provider has capacity. Runs on every
    /// enqueue and every completion.
    fn dispatch(inner: Arc<Inner>, provider: Arc<dyn ProviderBackend>) {
        tokio::spawn(async move {
            loop {
                let queued = {
                    let mut states = inner.states.lock().await;
                    let Some(state) = states.get_mut(provider.name()) else {
                        return;
                    };
                    if state.active >= state.ceiling {
                        return;
                    }
                    let Some(queued) = state.queue.pop() else {
                        return;
                    };
                    state.record_wait(queued.enqueued_at.elapsed());
                    state.active += 1;
                    queued
                };
                tokio::spawn(Self::execute(inner.clone(), provider.clone(), queued));
            }
        });
    }

    async fn execute(inner: Arc<Inner>, provider: Arc<dyn ProviderBackend>, mut queued: QueuedTask) {
        let started = Instant::now();
        let prompt = queued.task.prompt();
        let task_id = queued.task.id;
        let correlation_id = queued.task.correlation_id;
        let max_attempts = queued.task.max_retries.max(1);
        let mut attempt = queued.task.retry_count + 1;
        let mut last_err = Error::Internal("task resolved without an attempt".to_string());

        while attempt <= max_attempts {
            if let Some(deadline) = queued.deadline {
                if Instant::now() >= deadline {
                    last_err = Error::Timeout("deadline exceeded before attempt".to_string());
                    break;
                }
            }

            let call = provider.invoke(&queued.route.model, &prompt);
            let outcome = match queued.deadline {
                Some(deadline) => match timeout_at(deadline, call).await {
                    Ok(r) => r,
                    Err(_) => Err(Error::Timeout(
                        "deadline exceeded during provider call".to_string(),
                    )),
                },
                None => call.await,
            };

            match outcome {
                Ok(response) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    info!(
                        task_id = %task_id,
                        correlation_id = %correlation_id,
                        provider = provider.name(),
                        model = %queued.route.model,
                        duration_ms,
                        attempt,
                        "Task succeeded"
                    );
                    if let Some(usage) = response.usage {
                        let sink = inner.usage_sink.clone();
                        let provider_name = provider.name().to_string();
                        let model = queued.route.model.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                sink.record_usage(task_id, &usage, &provider_name, &model).await
                            {
                                warn!(task_id = %task_id, error = %e, "Usage recording failed");
                            }
                        });
                    }
                    let result = TaskResult::succeeded(
                        task_id,
                        response,
                        duration_ms,
                        provider.name(),
                        &queued.route.model,
                    );
                    Self::finish(&inner, provider, queued, result).await;
                    return;
                }
                Err(e) => {
                    warn!(
                        task_id = %task_id,
                        correlation_id = %correlation_id,
                        provider = provider.name(),
                        attempt,
                        error = %e,
                        error_category = %e.category(),
                        "Provider call failed"
                    );
                    let retryable = e.is_retryable();
                    last_err = e;
                    if !retryable || attempt >= max_attempts {
                        break;
                    }

                    let delay = backoff_delay(attempt);
                    if let Some(deadline) = queued.deadline {
                        if Instant::now() + delay >= deadline {
                            last_err =
                                Error::Timeout("deadline exceeded during backoff".to_string());
                            break;
                        }
                    }
                    queued.task.retry_count = attempt;

                    match inner.retry_policy {
                        RetryPolicy::InPlace => {
                            debug!(
                                task_id = %task_id,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Backing off in place"
                            );
                            sleep(delay).await;
                            attempt += 1;
                        }
                        RetryPolicy::Requeue => {
                            Self::release_and_requeue(inner, provider, queued, delay).await;
                            return;
                        }
                    }
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            task_id = %task_id,
            correlation_id = %correlation_id,
            provider = provider.name(),
            duration_ms,
            success = false,
            error_category = %last_err.category(),
            "Task failed terminally"
        );
        let result = TaskResult::failed(
            task_id,
            &last_err,
            duration_ms,
            provider.name(),
            &queued.route.model,
        );
        Self::finish(&inner, provider, queued, result).await;
    }

    /// Resolve the submitter, free the worker slot, and re-enter dispatch.
    async fn finish(
        inner: &Arc<Inner>,
        provider: Arc<dyn ProviderBackend>,
        queued: QueuedTask,
        result: TaskResult,
    ) {
        if queued.completion.send(result).is_err() {
            warn!(task_id = %queued.task.id, "Submitter dropped before completion");
        }
        {
            let mut states = inner.states.lock().await;
            if let Some(state) = states.get_mut(provider.name()) {
                state.active = state.active.saturating_sub(1);
            }
        }
        Self::dispatch(inner.clone(), provider);
    }

    /// Requeue policy: give the slot back for the duration of the backoff,
    /// then re-enter the queue with a fresh sequence number.
    async fn release_and_requeue(
        inner: Arc<Inner>,
        provider: Arc<dyn ProviderBackend>,
        mut queued: QueuedTask,
        delay: Duration,
    ) {
        {
            let mut states = inner.states.lock().await;
            if let Some(state) = states.get_mut(provider.name()) {
                state.active = state.active.saturating_sub(1);
            }
        }
        Self::dispatch(inner.clone(), provider.clone());

        sleep(delay).await;

        queued.seq = inner.seq.fetch_add(1, Ordering::Relaxed);
        queued.enqueued_at = Instant::now();
        debug!(task_id = %queued.task.id, "Requeueing after backoff");
        {
            let mut states = inner.states.lock().await;
            if let Some(state) = states.get_mut(provider.name()) {
                state.queue.push(queued);
            }
        }
        Self::dispatch(inner, provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::join_all;
    use prism_core::{ErrorCategory, TaskStep, TokenUsage};
    use prism_inference::MockBackend;
    use serde_json::json;

    fn registry_with(mock: &MockBackend) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(mock.clone()));
        registry
    }

    fn free_task(prompt: &str) -> Task {
        Task::new("owner", TaskStep::Match, json!({ "prompt": prompt }))
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_bounds_concurrency_and_all_complete() {
        let mock = MockBackend::new("ollama")
            .with_max_concurrency(3)
            .with_latency(Duration::from_millis(50));
        let scheduler = Scheduler::new(registry_with(&mock));

        let submissions = (0..10).map(|i| {
            scheduler.submit(free_task(&format!("task-{i}")), ProviderTier::Free)
        });
        let results = join_all(submissions).await;

        assert_eq!(results.len(), 10);
        for result in results {
            assert!(result.unwrap().success);
        }
        assert_eq!(mock.call_count(), 10);
        assert!(mock.max_observed_active() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn higher_priority_overtakes_lower_in_queue() {
        // One slot: first task occupies it, the rest queue up. A priority-5
        // task submitted after a priority-1 task must still run before it.
        let mock = MockBackend::new("ollama")
            .with_max_concurrency(1)
            .with_latency(Duration::from_millis(100));
        let scheduler = Scheduler::new(registry_with(&mock));

        let mut handles = Vec::new();
        for (prompt, priority) in [("a", 3), ("c", 1), ("b", 5)] {
            let scheduler = scheduler.clone();
            let task = free_task(prompt).with_priority(priority);
            handles.push(tokio::spawn(async move {
                scheduler.submit(task, ProviderTier::Free).await
            }));
            // Let the submission enqueue before the next one.
            sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().success);
        }

        let order: Vec<String> = mock.calls().into_iter().map(|c| c.prompt).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_task_exhausts_retries_with_backoff() {
        let mock = MockBackend::new("ollama").failing(usize::MAX, ErrorCategory::Provider);
        let scheduler = Scheduler::new(registry_with(&mock));

        let start = Instant::now();
        let result = scheduler
            .submit(free_task("p").with_max_retries(3), ProviderTier::Free)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::Provider));
        assert_eq!(mock.call_count(), 3);
        // Backoff between the three attempts: 1s then 2s.
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delay_is_capped() {
        let mock = MockBackend::new("ollama").failing(usize::MAX, ErrorCategory::Network);
        let scheduler = Scheduler::new(registry_with(&mock));

        let start = Instant::now();
        let result = scheduler
            .submit(free_task("p").with_max_retries(6), ProviderTier::Free)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(mock.call_count(), 6);
        // 1 + 2 + 4 + 8 + 8 seconds, the last two capped.
        assert!(start.elapsed() >= Duration::from_secs(23));
        assert!(start.elapsed() < Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_recover_within_budget() {
        let mock = MockBackend::new("ollama").failing(2, ErrorCategory::RateLimit);
        let scheduler = Scheduler::new(registry_with(&mock));

        let result = scheduler
            .submit(free_task("p").with_max_retries(3), ProviderTier::Free)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_immediate() {
        let mock = MockBackend::new("ollama").failing(usize::MAX, ErrorCategory::InputValidation);
        let scheduler = Scheduler::new(registry_with(&mock));

        let result = scheduler
            .submit(free_task("p").with_max_retries(3), ProviderTier::Free)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::InputValidation));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_inflight_call() {
        let mock = MockBackend::new("ollama").with_latency(Duration::from_secs(60));
        let scheduler = Scheduler::new(registry_with(&mock));

        let start = Instant::now();
        let result = scheduler
            .submit_with_deadline(free_task("p"), ProviderTier::Free, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::Timeout));
        // Resolved at the deadline, not at provider latency.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_backoff_sleeps() {
        let mock = MockBackend::new("ollama").failing(usize::MAX, ErrorCategory::Provider);
        let scheduler = Scheduler::new(registry_with(&mock));

        let start = Instant::now();
        let result = scheduler
            .submit_with_deadline(
                free_task("p").with_max_retries(10),
                ProviderTier::Free,
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::Timeout));
        assert!(start.elapsed() <= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_route_is_submit_error() {
        let mock = MockBackend::new("ollama");
        let scheduler = Scheduler::builder(registry_with(&mock))
            .routes(ModelRoutes::new())
            .build();

        let err = scheduler
            .submit(free_task("p"), ProviderTier::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn not_ready_provider_is_submit_error() {
        let mock = MockBackend::new("ollama").with_ready(false);
        let scheduler = Scheduler::new(registry_with(&mock));

        let err = scheduler
            .submit(free_task("p"), ProviderTier::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn status_and_positions_track_the_pool() {
        let mock = MockBackend::new("ollama")
            .with_max_concurrency(1)
            .with_latency(Duration::from_millis(100));
        let scheduler = Scheduler::new(registry_with(&mock));

        let running = free_task("running").with_priority(3);
        let waiting_high = free_task("high").with_priority(5);
        let waiting_low = free_task("low").with_priority(1);
        let (high_id, low_id) = (waiting_high.id, waiting_low.id);

        let mut handles = Vec::new();
        for task in [running, waiting_high, waiting_low] {
            let scheduler = scheduler.clone();
            handles.push(tokio::spawn(async move {
                scheduler.submit(task, ProviderTier::Free).await
            }));
            sleep(Duration::from_millis(1)).await;
        }

        let status = scheduler.status("ollama").await.unwrap();
        assert_eq!(status.pending, 2);
        assert_eq!(status.active, 1);
        assert_eq!(status.max_concurrency, 1);

        assert_eq!(scheduler.queue_position(high_id).await, Some(0));
        assert_eq!(scheduler.queue_position(low_id).await, Some(1));

        for handle in handles {
            assert!(handle.await.unwrap().unwrap().success);
        }

        let drained = scheduler.status("ollama").await.unwrap();
        assert_eq!(drained.pending, 0);
        assert_eq!(drained.active, 0);
        assert!(scheduler.queue_position(high_id).await.is_none());

        assert!(scheduler.status("unknown").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn requeue_policy_releases_the_slot_during_backoff() {
        let mock = MockBackend::new("ollama")
            .with_max_concurrency(1)
            .failing(1, ErrorCategory::RateLimit);
        let scheduler = Scheduler::builder(registry_with(&mock))
            .retry_policy(RetryPolicy::Requeue)
            .build();

        let flaky = scheduler.clone();
        let flaky_handle = tokio::spawn(async move {
            flaky
                .submit(free_task("flaky").with_max_retries(2), ProviderTier::Free)
                .await
        });
        sleep(Duration::from_millis(1)).await;

        // Submitted while the first task is backing off; with the slot
        // released it completes before the retry.
        let quick = scheduler
            .submit(free_task("quick"), ProviderTier::Free)
            .await
            .unwrap();
        assert!(quick.success);

        let flaky_result = flaky_handle.await.unwrap().unwrap();
        assert!(flaky_result.success);

        let order: Vec<String> = mock.calls().into_iter().map(|c| c.prompt).collect();
        assert_eq!(order, vec!["flaky", "quick", "flaky"]);
    }

    struct RecordingSink {
        records: std::sync::Mutex<Vec<(Uuid, TokenUsage, String, String)>>,
    }

    #[async_trait]
    impl UsageSink for RecordingSink {
        async fn record_usage(
            &self,
            task_id: Uuid,
            usage: &TokenUsage,
            provider: &str,
            model: &str,
        ) -> prism_core::Result<()> {
            self.records.lock().unwrap().push((
                task_id,
                *usage,
                provider.to_string(),
                model.to_string(),
            ));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn usage_is_recorded_on_success() {
        let mock = MockBackend::new("ollama");
        let sink = Arc::new(RecordingSink {
            records: std::sync::Mutex::new(Vec::new()),
        });
        let scheduler = Scheduler::builder(registry_with(&mock))
            .usage_sink(sink.clone())
            .build();

        let task = free_task("p");
        let task_id = task.id;
        let result = scheduler.submit(task, ProviderTier::Free).await.unwrap();
        assert!(result.success);

        // Recording is fire-and-forget; give the spawned task a tick.
        sleep(Duration::from_millis(10)).await;

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, task_id);
        assert_eq!(records[0].1.total_tokens(), 15);
        assert_eq!(records[0].2, "ollama");
    }
}
