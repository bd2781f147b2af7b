//! Per-provider priority queue.
//!
//! Ordering contract: higher priority dispatches first; equal priorities
//! preserve arrival order. Arrival order is pinned by a monotonic
//! sequence number so a requeued task re-enters at the back of its
//! priority class.

use prism_core::{Task, TaskResult};
use prism_inference::ModelRoute;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

/// A task waiting in (or popped from) one provider's queue, together with
/// everything execution needs.
pub(crate) struct QueuedTask {
    pub task: Task,
    pub route: ModelRoute,
    /// When the task entered the queue; reset on requeue.
    pub enqueued_at: Instant,
    /// Monotonic arrival sequence, FIFO tie-breaker within a priority.
    pub seq: u64,
    /// Absolute deadline bounding every attempt and backoff sleep.
    pub deadline: Option<Instant>,
    /// Resolves the caller's `submit` future with the terminal result.
    pub completion: oneshot::Sender<TaskResult>,
}

/// Insertion-sorted queue: priority descending, sequence ascending.
///
/// Queues stay short (bounded by caller fan-out), so a `Vec` with ordered
/// insertion beats a heap on simplicity and gives stable positions for
/// `queue_position` reporting.
#[derive(Default)]
pub(crate) struct ProviderQueue {
    items: Vec<QueuedTask>,
}

impl ProviderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, queued: QueuedTask) {
        let pos = self
            .items
            .iter()
            .position(|q| {
                q.task.priority < queued.task.priority
                    || (q.task.priority == queued.task.priority && q.seq > queued.seq)
            })
            .unwrap_or(self.items.len());
        self.items.insert(pos, queued);
    }

    /// Remove and return the next task to dispatch.
    pub fn pop(&mut self) -> Option<QueuedTask> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Zero-based dispatch position of a waiting task.
    pub fn position(&self, task_id: Uuid) -> Option<usize> {
        self.items.iter().position(|q| q.task.id == task_id)
    }
}
