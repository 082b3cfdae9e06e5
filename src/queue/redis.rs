//! Redis-backed task queue.
//!
//! [`RedisQueue`] keeps the whole queue in a single Redis list key. `push`
//! performs an atomic `RPUSH` of the JSON-serialized task; `pop` performs a
//! blocking `BLPOP` with the caller's timeout; `len` issues `LLEN`. FIFO
//! ordering follows from the list semantics.
//!
//! # Key Schema
//!
//! | Key Pattern | Type | Purpose |
//! |-------------|------|---------|
//! | `{key}` (default `conveyor:queue`) | List | Serialized pending tasks |
//!
//! No other keys are written.
//!
//! # Malformed Entries
//!
//! An entry that does not decode as a task record is discarded and counted
//! via [`Metrics::record_malformed_entry`] -- it is never returned to a
//! worker and never re-enqueued. The pop then continues with the remaining
//! timeout budget.
//!
//! # Connection Model
//!
//! `RedisQueue` holds a [`MultiplexedConnection`], which is designed to be
//! cloned cheaply -- all clones share one TCP connection. Each method clones
//! the connection for concurrent safety.

use std::sync::Arc;
use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::Task;
use crate::error::BackendError;
use crate::metrics::Metrics;
use crate::queue::TaskQueue;

/// Default Redis list key holding the queue.
pub const DEFAULT_QUEUE_KEY: &str = "conveyor:queue";

/// Task queue backed by a single Redis list.
///
/// # Examples
///
/// ```rust,no_run
/// use conveyor::queue::RedisQueue;
///
/// # async fn example() {
/// let queue = RedisQueue::connect("redis://127.0.0.1:6379")
///     .await
///     .unwrap()
///     .with_key("myapp:queue");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
    key: String,
    metrics: Arc<Metrics>,
}

impl RedisQueue {
    /// Creates a queue by connecting to Redis at the given URL.
    ///
    /// The URL format is `redis://[:<password>@]<host>:<port>[/<db>]`.
    /// Uses the default list key [`DEFAULT_QUEUE_KEY`]. Fails fast if the
    /// connection cannot be established.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the client cannot be created
    /// or the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let client = ::redis::Client::open(url).map_err(|e| BackendError::Unavailable {
            message: format!("failed to create Redis client: {e}"),
            source: Some(Box::new(e)),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::Unavailable {
                message: format!("failed to connect to Redis: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self::with_connection(conn))
    }

    /// Creates a queue with a pre-built multiplexed connection.
    ///
    /// Useful when the caller manages connection lifecycle or shares one
    /// connection between the queue and the result store.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            key: DEFAULT_QUEUE_KEY.to_string(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Sets a custom list key (builder pattern).
    ///
    /// Useful for test isolation: each test run can use a unique key so
    /// runs do not interfere with each other.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Shares a counter set with the rest of the deployment.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The counter set recording discarded malformed entries.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn push(&self, task: &Task) -> Result<(), BackendError> {
        let payload = serde_json::to_string(task).map_err(|e| BackendError::Encoding {
            message: format!("failed to serialize task {}: {e}", task.id),
        })?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(&self.key, payload).await?;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Task>, BackendError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            // BLPOP takes fractional seconds; 0 would block forever, so the
            // remaining budget is floored at one millisecond.
            let secs = remaining.as_secs_f64().max(0.001);
            let mut conn = self.conn.clone();
            let entry: Option<(String, String)> = conn.blpop(&self.key, secs).await?;

            let Some((_, raw)) = entry else {
                return Ok(None);
            };

            match serde_json::from_str::<Task>(&raw) {
                Ok(task) => return Ok(Some(task)),
                Err(e) => {
                    // Discard and count; never re-enqueue.
                    self.metrics.record_malformed_entry();
                    tracing::warn!(
                        key = %self.key,
                        error = %e,
                        "discarded malformed queue entry"
                    );
                }
            }
        }
    }

    async fn len(&self) -> Result<usize, BackendError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(&self.key).await?;
        Ok(len)
    }
}

/// Integration tests for [`RedisQueue`] against a real Redis instance.
///
/// These tests require a running Redis (default `redis://127.0.0.1:6379`;
/// override with the `REDIS_URL` environment variable). Run with:
///
/// ```bash
/// cargo test --features redis-tests -- redis_
/// ```
///
/// Each test uses a unique key for isolation, so no cleanup is needed.
#[cfg(all(test, feature = "redis-tests"))]
mod integration_tests {
    use super::*;
    use crate::domain::TaskSpec;
    use serde_json::Map;

    async fn test_queue() -> RedisQueue {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let queue = RedisQueue::connect(&url)
            .await
            .expect("Redis connection failed -- is Redis running?");
        queue.with_key(format!("test:queue:{}", crate::domain::new_task_id()))
    }

    fn task(kind: &str) -> Task {
        Task::from_spec(TaskSpec {
            id: None,
            kind: kind.to_string(),
            payload: Map::new(),
        })
    }

    #[tokio::test]
    async fn redis_push_pop_round_trip() {
        let queue = test_queue().await;
        let submitted = task("roundtrip");
        queue.push(&submitted).await.unwrap();

        let popped = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(popped.id, submitted.id);
        assert_eq!(popped.kind, submitted.kind);
        assert_eq!(popped.submitted_at, submitted.submitted_at);
    }

    #[tokio::test]
    async fn redis_pop_times_out_on_empty_key() {
        let queue = test_queue().await;
        let popped = queue.pop(Duration::from_millis(200)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn redis_pop_preserves_fifo() {
        let queue = test_queue().await;
        let a = task("a");
        let b = task("b");
        queue.push(&a).await.unwrap();
        queue.push(&b).await.unwrap();

        let first = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        let second = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(second.id, b.id);
    }

    #[tokio::test]
    async fn redis_len_counts_entries() {
        let queue = test_queue().await;
        assert_eq!(queue.len().await.unwrap(), 0);
        queue.push(&task("a")).await.unwrap();
        queue.push(&task("b")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn redis_malformed_entry_discarded_and_counted() {
        let queue = test_queue().await;

        // Inject garbage directly, then a valid task behind it.
        let mut conn = queue.conn.clone();
        let _: () = conn.rpush(&queue.key, "not json").await.unwrap();
        let valid = task("valid");
        queue.push(&valid).await.unwrap();

        let popped = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(popped.id, valid.id);
        assert_eq!(queue.metrics().malformed_entries(), 1);
    }
}
