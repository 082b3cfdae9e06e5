//! Task queue capability: the FIFO channel from submitters to workers.
//!
//! # Architecture
//!
//! [`TaskQueue`] is a transport trait with no domain logic -- backends move
//! serialized task records and nothing else. Two implementations exist:
//!
//! - [`MemoryQueue`](memory::MemoryQueue) -- in-process queue guarded by a
//!   mutex with a condition signal. Not durable.
//! - [`RedisQueue`](redis::RedisQueue) -- a single Redis list key, pushed
//!   with `RPUSH` and popped with blocking `BLPOP`. Durable to the extent
//!   Redis is.
//!
//! The backend is chosen once at construction (see
//! [`build_queue`](crate::app::build_queue)); all submitters and executors
//! of a deployment share one queue through `Arc<dyn TaskQueue>`.
//!
//! # Contract
//!
//! - `push` appends to the tail; `pop` removes from the head; ordering is
//!   FIFO per queue.
//! - `pop` blocks up to the given timeout and returns `Ok(None)` when it
//!   elapses with the queue empty.
//! - Concurrent poppers each receive distinct entries.
//! - `len` is best-effort and may be stale under concurrent mutation.
//! - Transport faults surface as [`BackendError::Unavailable`]; the queue
//!   never reports application-level failures.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Task;
use crate::error::BackendError;

pub use memory::MemoryQueue;
pub use redis::RedisQueue;

/// FIFO task channel shared by all submitters and executors.
///
/// Implementations must be `Send + Sync`; a single instance is used
/// concurrently by every submitter and every executor of a deployment.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Appends a task to the tail of the queue.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`] when the underlying transport is down;
    /// [`BackendError::Encoding`] when the task cannot be serialized.
    async fn push(&self, task: &Task) -> Result<(), BackendError>;

    /// Removes and returns the head of the queue, blocking up to `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing available.
    /// A malformed entry at the head is discarded (and counted by the
    /// backend), never returned and never re-enqueued.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`] when the underlying transport is down.
    async fn pop(&self, timeout: Duration) -> Result<Option<Task>, BackendError>;

    /// Best-effort current queue length.
    ///
    /// May be stale by the time the caller observes it.
    async fn len(&self) -> Result<usize, BackendError>;
}
