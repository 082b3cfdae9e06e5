//! In-process result store with TTL-based reclamation.
//!
//! [`MemoryResultStore`] maps task ids to `(record, expires_at)` pairs in a
//! [`DashMap`]. Expiry is enforced twice:
//!
//! - **Lazily** -- every read checks `expires_at` against the current time
//!   and treats expired entries as absent (removing them on the way out).
//! - **Eagerly** -- a background reaper wakes at a fixed cadence (default
//!   60 s), collects the expired keys, and removes them one at a time so it
//!   never holds the map longer than one entry's removal.
//!
//! The reaper is owned by the store: it is spawned at construction, holds
//! only a [`Weak`] reference to the map, and is aborted when the store is
//! dropped. It cannot outlive the store.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::Task;
use crate::error::BackendError;
use crate::store::ResultStore;

/// Cadence at which the reaper scans for expired records.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct StoredResult {
    task: Task,
    expires_at: Instant,
}

/// Thread-safe in-memory result store for single-process deployments.
///
/// Must be constructed inside a tokio runtime (the reaper is spawned at
/// construction). Records are lost on process exit.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use conveyor::store::{MemoryResultStore, ResultStore};
///
/// # async fn example(task: conveyor::domain::Task) {
/// let store = MemoryResultStore::new();
/// store.put(&task, Duration::from_secs(3600)).await.unwrap();
/// assert!(store.exists(&task.id).await.unwrap());
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryResultStore {
    entries: Arc<DashMap<String, StoredResult>>,
    reaper: JoinHandle<()>,
}

impl MemoryResultStore {
    /// Creates an empty store with the default reaper cadence.
    pub fn new() -> Self {
        Self::with_reaper_interval(DEFAULT_REAPER_INTERVAL)
    }

    /// Creates an empty store whose reaper wakes at the given cadence.
    pub fn with_reaper_interval(interval: Duration) -> Self {
        let entries: Arc<DashMap<String, StoredResult>> = Arc::new(DashMap::new());
        let reaper = spawn_reaper(Arc::downgrade(&entries), interval);
        Self { entries, reaper }
    }

    /// Number of records currently held, including not-yet-reaped expired
    /// ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryResultStore {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

fn spawn_reaper(entries: Weak<DashMap<String, StoredResult>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; skip it so
        // the first scan happens one full interval after construction.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(entries) = entries.upgrade() else {
                break;
            };
            let now = Instant::now();
            let expired: Vec<String> = entries
                .iter()
                .filter(|entry| entry.value().expires_at <= now)
                .map(|entry| entry.key().clone())
                .collect();
            let removed = expired.len();
            for key in expired {
                entries.remove(&key);
            }
            if removed > 0 {
                tracing::debug!(removed, "reaped expired result records");
            }
        }
    })
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(&self, task: &Task, ttl: Duration) -> Result<(), BackendError> {
        self.entries.insert(
            task.id.clone(),
            StoredResult {
                task: task.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Task>, BackendError> {
        let expired = match self.entries.get(id) {
            None => return Ok(None),
            Some(entry) if entry.value().expires_at <= Instant::now() => true,
            Some(entry) => return Ok(Some(entry.value().task.clone())),
        };
        if expired {
            // Lazy expiry: drop the dead entry instead of waiting for the
            // reaper.
            self.entries.remove(id);
        }
        Ok(None)
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.entries.remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, BackendError> {
        Ok(self.get(id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskSpec;
    use serde_json::{json, Map};

    fn finished_task(kind: &str) -> Task {
        let mut task = Task::from_spec(TaskSpec {
            id: None,
            kind: kind.to_string(),
            payload: Map::new(),
        });
        task.mark_running();
        task.complete(json!("done"));
        task
    }

    #[tokio::test]
    async fn put_then_get_returns_record() {
        let store = MemoryResultStore::new();
        let task = finished_task("a");
        store.put(&task, Duration::from_secs(60)).await.unwrap();

        let fetched = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, task.id);
        assert_eq!(fetched.result, Some(json!("done")));
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = MemoryResultStore::new();
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_prior_record() {
        let store = MemoryResultStore::new();
        let mut task = finished_task("a");
        store.put(&task, Duration::from_secs(60)).await.unwrap();

        task.result = Some(json!("overwritten"));
        store.put(&task, Duration::from_secs(60)).await.unwrap();

        let fetched = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.result, Some(json!("overwritten")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn expired_record_is_absent_on_read() {
        let store = MemoryResultStore::new();
        let task = finished_task("a");
        store.put(&task, Duration::from_millis(20)).await.unwrap();
        assert!(store.exists(&task.id).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(&task.id).await.unwrap().is_none());
        assert!(!store.exists(&task.id).await.unwrap());
        // Lazy expiry removed the entry outright.
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn reaper_removes_expired_records() {
        let store = MemoryResultStore::with_reaper_interval(Duration::from_millis(30));
        let task = finished_task("a");
        store.put(&task, Duration::from_millis(10)).await.unwrap();
        assert_eq!(store.len(), 1);

        // No reads happen here; only the reaper can reclaim the entry.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn reaper_keeps_live_records() {
        let store = MemoryResultStore::with_reaper_interval(Duration::from_millis(20));
        let task = finished_task("a");
        store.put(&task, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len(), 1);
        assert!(store.exists(&task.id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryResultStore::new();
        let task = finished_task("a");
        store.put(&task, Duration::from_secs(60)).await.unwrap();

        store.delete(&task.id).await.unwrap();
        assert!(!store.exists(&task.id).await.unwrap());

        // Deleting again (and deleting never-stored ids) succeeds.
        store.delete(&task.id).await.unwrap();
        store.delete("never-stored").await.unwrap();
    }

    #[tokio::test]
    async fn reaper_stops_when_store_is_dropped() {
        let store = MemoryResultStore::with_reaper_interval(Duration::from_millis(10));
        let reaper_probe = store.reaper.abort_handle();
        drop(store);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(reaper_probe.is_finished());
    }
}
