//! In-process task queue.
//!
//! A single ordered sequence guarded by a [`tokio::sync::Mutex`] with a
//! [`Notify`] condition signal. `push` appends and signals one waiter;
//! `pop` waits on the signal until the sequence is non-empty or the
//! deadline passes, then removes the head. Distinct concurrent poppers
//! always receive distinct entries because removal happens under the lock.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::Task;
use crate::error::BackendError;
use crate::queue::TaskQueue;

/// In-memory FIFO queue for single-process deployments.
///
/// Tasks are stored directly (no serialization round-trip); the queue is
/// lost on process exit. Safe for any number of concurrent submitters and
/// poppers.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use conveyor::domain::{Task, TaskSpec};
/// use conveyor::queue::{MemoryQueue, TaskQueue};
///
/// # async fn example() {
/// let queue = MemoryQueue::new();
/// let task = Task::from_spec(serde_json::from_str(r#"{"kind": "noop"}"#).unwrap());
/// queue.push(&task).await.unwrap();
/// let popped = queue.pop(Duration::from_millis(10)).await.unwrap();
/// assert_eq!(popped.unwrap().id, task.id);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<Task>>,
    notify: Notify,
}

impl MemoryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push(&self, task: &Task) -> Result<(), BackendError> {
        let mut items = self.items.lock().await;
        items.push_back(task.clone());
        drop(items);
        // Wake one waiter. Notify stores a permit when nobody is waiting,
        // so a pop that races this push still observes the entry.
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Task>, BackendError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut items = self.items.lock().await;
                if let Some(task) = items.pop_front() {
                    if !items.is_empty() {
                        // A push only signals once; hand the permit on so a
                        // second waiter is not left sleeping on a non-empty
                        // queue.
                        self.notify.notify_one();
                    }
                    return Ok(Some(task));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, self.notify.notified())
                .await
                .is_err()
            {
                // Deadline elapsed; one final check so a push that raced the
                // timeout is not stranded until the next poll.
                let mut items = self.items.lock().await;
                return Ok(items.pop_front());
            }
        }
    }

    async fn len(&self) -> Result<usize, BackendError> {
        Ok(self.items.lock().await.len())
    }
}
