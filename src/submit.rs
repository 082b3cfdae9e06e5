//! Submission API: accept a task specification, assign identity, enqueue.

use std::sync::Arc;

use crate::domain::{Task, TaskSpec};
use crate::error::SubmitError;
use crate::queue::TaskQueue;

/// Handle through which clients submit tasks to the shared queue.
///
/// Cloning is cheap; all clones push onto the same queue. A failed
/// submission enqueues nothing and returns no id, so the caller may simply
/// retry.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use conveyor::queue::MemoryQueue;
/// use conveyor::submit::Submitter;
///
/// # async fn example() {
/// let submitter = Submitter::new(Arc::new(MemoryQueue::new()));
/// let spec = serde_json::from_str(r#"{"kind": "square", "payload": {"x": 7}}"#).unwrap();
/// let id = submitter.submit(spec).await.unwrap();
/// assert_eq!(id.len(), 32);
/// # }
/// ```
#[derive(Clone)]
pub struct Submitter {
    queue: Arc<dyn TaskQueue>,
}

impl Submitter {
    /// Creates a submitter pushing onto the given queue.
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Validates the specification, assigns identity, enqueues, and returns
    /// the task id.
    ///
    /// The task is pending with `submitted_at` stamped from this process's
    /// clock. Once this returns, the task is durable iff the queue backend
    /// is durable.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::EmptyKind`] when `spec.kind` is empty.
    /// - [`SubmitError::Backend`] when the queue rejects the push; nothing
    ///   was enqueued and no id was assigned to anything observable.
    pub async fn submit(&self, spec: TaskSpec) -> Result<String, SubmitError> {
        if spec.kind.is_empty() {
            return Err(SubmitError::EmptyKind);
        }

        let task = Task::from_spec(spec);
        self.queue.push(&task).await?;
        tracing::debug!(task_id = %task.id, kind = %task.kind, "task enqueued");
        Ok(task.id)
    }

    /// Best-effort current queue depth.
    pub async fn queue_len(&self) -> Result<usize, crate::error::BackendError> {
        self.queue.len().await
    }
}
