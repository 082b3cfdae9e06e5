//! Result store capability: TTL-bound retention of terminal task records.
//!
//! # Architecture
//!
//! [`ResultStore`] is a transport trait with no domain logic. Workers `put`
//! a terminal record with a TTL when a task finishes; the retrieval API
//! reads and deletes by task id. Two implementations exist:
//!
//! - [`MemoryResultStore`](memory::MemoryResultStore) -- in-process map
//!   with lazy expiry on read plus a periodic background reaper.
//! - [`RedisResultStore`](redis::RedisResultStore) -- one string key per
//!   result with a native Redis TTL; no local reaper.
//!
//! The backend is chosen once at construction (see
//! [`build_result_store`](crate::app::build_result_store)).
//!
//! # Contract
//!
//! - `put` overwrites any prior record for the same id and sets expiry to
//!   now + ttl.
//! - `get` never returns an expired record.
//! - `delete` is idempotent; deleting an absent id succeeds.
//! - `exists(id)` is equivalent to `get(id)` presence.
//! - Every operation is individually atomic with respect to other
//!   operations on the same id.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Task;
use crate::error::BackendError;

pub use memory::MemoryResultStore;
pub use redis::RedisResultStore;

/// TTL-bound store from which clients retrieve terminal task records.
///
/// Implementations must be `Send + Sync`; a single instance is shared by
/// every executor and every retrieval request of a deployment.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Stores a terminal record, overwriting any prior record for the same
    /// id, with expiry = now + `ttl`.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`] when the underlying transport is down;
    /// [`BackendError::Encoding`] when the record cannot be serialized.
    async fn put(&self, task: &Task, ttl: Duration) -> Result<(), BackendError>;

    /// Returns the record for `id`, or `None` if absent or expired.
    async fn get(&self, id: &str) -> Result<Option<Task>, BackendError>;

    /// Removes the record for `id`. Deleting an absent id succeeds.
    async fn delete(&self, id: &str) -> Result<(), BackendError>;

    /// Returns `true` if a live (non-expired) record exists for `id`.
    async fn exists(&self, id: &str) -> Result<bool, BackendError>;
}
