//! Redis-backed result store.
//!
//! Each result is a single string key holding the JSON-serialized terminal
//! record, created with `SET ... EX <ttl>` so that Redis performs the
//! expiry -- there is no local reaper. A missing key and a key past its TTL
//! are indistinguishable, which is exactly the contract: both read as
//! absent.
//!
//! # Key Schema
//!
//! | Key Pattern | Type | Purpose |
//! |-------------|------|---------|
//! | `{prefix}:{id}` (default prefix `conveyor:result`) | String | Serialized terminal record with TTL |
//!
//! No other keys are written.
//!
//! # Connection Model
//!
//! `RedisResultStore` holds a [`MultiplexedConnection`], cloned cheaply per
//! call; all clones share one TCP connection and are safe for concurrent
//! use by every executor.

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;

use crate::domain::Task;
use crate::error::BackendError;
use crate::store::ResultStore;

/// Default prefix for result keys.
pub const DEFAULT_RESULT_KEY_PREFIX: &str = "conveyor:result";

/// Result store backed by per-key TTL'd Redis strings.
///
/// # Examples
///
/// ```rust,no_run
/// use conveyor::store::RedisResultStore;
///
/// # async fn example() {
/// let store = RedisResultStore::connect("redis://127.0.0.1:6379")
///     .await
///     .unwrap()
///     .with_prefix("myapp:result");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RedisResultStore {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisResultStore {
    /// Creates a store by connecting to Redis at the given URL.
    ///
    /// Uses the default key prefix [`DEFAULT_RESULT_KEY_PREFIX`]. Fails
    /// fast if the connection cannot be established.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the client cannot be
    /// created or the connection cannot be established.
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

    /// Creates a store with a pre-built multiplexed connection.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            key_prefix: DEFAULT_RESULT_KEY_PREFIX.to_string(),
        }
    }

    /// Sets a custom key prefix (builder pattern).
    ///
    /// Useful for test isolation: each test run can use a unique prefix so
    /// runs do not interfere with each other.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn result_key(&self, id: &str) -> String {
        format!("{}:{}", self.key_prefix, id)
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn put(&self, task: &Task, ttl: Duration) -> Result<(), BackendError> {
        let payload = serde_json::to_string(task).map_err(|e| BackendError::Encoding {
            message: format!("failed to serialize result for task {}: {e}", task.id),
        })?;
        // SET EX takes whole seconds and rejects 0; sub-second TTLs round up.
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(self.result_key(&task.id), payload, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Task>, BackendError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.result_key(id)).await?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let task = serde_json::from_str(&raw).map_err(|e| BackendError::Encoding {
                    message: format!("failed to deserialize result for task {id}: {e}"),
                })?;
                Ok(Some(task))
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        // DEL of an absent key is a no-op, which gives idempotence for free.
        let _: () = conn.del(self.result_key(id)).await?;
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, BackendError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.result_key(id)).await?;
        Ok(exists)
    }
}

/// Integration tests for [`RedisResultStore`] against a real Redis
/// instance.
///
/// These tests require a running Redis (default `redis://127.0.0.1:6379`;
/// override with the `REDIS_URL` environment variable). Run with:
///
/// ```bash
/// cargo test --features redis-tests -- redis_
/// ```
#[cfg(all(test, feature = "redis-tests"))]
mod integration_tests {
    use super::*;
    use crate::domain::TaskSpec;
    use serde_json::{json, Map};

    async fn test_store() -> RedisResultStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisResultStore::connect(&url)
            .await
            .expect("Redis connection failed -- is Redis running?");
        store.with_prefix(format!("test:result:{}", crate::domain::new_task_id()))
    }

    fn finished_task() -> Task {
        let mut task = Task::from_spec(TaskSpec {
            id: None,
            kind: "square".to_string(),
            payload: Map::new(),
        });
        task.mark_running();
        task.complete(json!(49));
        task
    }

    #[tokio::test]
    async fn redis_put_get_round_trip() {
        let store = test_store().await;
        let task = finished_task();
        store.put(&task, Duration::from_secs(60)).await.unwrap();

        let fetched = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, task.id);
        assert_eq!(fetched.result, Some(json!(49)));
        assert_eq!(fetched.finished_at, task.finished_at);
    }

    #[tokio::test]
    async fn redis_get_missing_returns_none() {
        let store = test_store().await;
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redis_delete_is_idempotent() {
        let store = test_store().await;
        let task = finished_task();
        store.put(&task, Duration::from_secs(60)).await.unwrap();

        store.delete(&task.id).await.unwrap();
        assert!(!store.exists(&task.id).await.unwrap());
        store.delete(&task.id).await.unwrap();
    }

    #[tokio::test]
    async fn redis_ttl_expires_record() {
        let store = test_store().await;
        let task = finished_task();
        store.put(&task, Duration::from_secs(1)).await.unwrap();
        assert!(store.exists(&task.id).await.unwrap());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!store.exists(&task.id).await.unwrap());
        assert!(store.get(&task.id).await.unwrap().is_none());
    }
}
