//! The executor pool: pop, execute, publish, repeat.
//!
//! [`WorkerPool::spawn`] starts N concurrent executors against one shared
//! queue and one shared result store. Each executor runs the same loop:
//!
//! 1. `pop(poll_timeout)` from the queue, raced against the shutdown
//!    signal; absent means loop.
//! 2. Mark the task running (locally; not externally visible).
//! 3. Look up the handler for the task's kind; a missing registration is a
//!    `failed` outcome, not an executor error.
//! 4. Invoke the handler in its own task, bounded by the configured
//!    execution deadline. A handler that returns an error, overruns the
//!    deadline, or panics produces a `failed` outcome; the executor
//!    survives all three.
//! 5. Publish the terminal record to the result store, retrying transport
//!    faults with bounded exponential backoff. Exhausted publication drops
//!    the outcome and counts it.
//!
//! Delivery is at-most-once: a task popped by an executor that dies before
//! publication is lost; nothing is re-enqueued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::domain::Task;
use crate::metrics::Metrics;
use crate::queue::TaskQueue;
use crate::store::ResultStore;
use crate::worker::HandlerRegistry;

/// How long an executor sleeps after a failed pop before polling again.
const POP_FAILURE_BACKOFF: Duration = Duration::from_millis(500);

/// Tunables for the executor loop.
///
/// # Defaults
///
/// | Setting                   | Default | Description                            |
/// |---------------------------|---------|----------------------------------------|
/// | `poll_timeout`            | 1 s     | Queue pop timeout per iteration        |
/// | `result_ttl`              | 3600 s  | TTL applied to published results       |
/// | `handler_timeout`         | none    | Per-task execution deadline            |
/// | `publish_attempts`        | 5       | Total result publication attempts      |
/// | `publish_initial_backoff` | 100 ms  | Backoff before the second attempt      |
/// | `publish_max_backoff`     | 5 s     | Backoff cap (doubles until reached)    |
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Queue pop timeout per loop iteration.
    pub poll_timeout: Duration,

    /// TTL applied to every published result record.
    pub result_ttl: Duration,

    /// Per-task execution deadline. `None` means handlers run unbounded.
    pub handler_timeout: Option<Duration>,

    /// Total publication attempts before the outcome is dropped.
    pub publish_attempts: u32,

    /// Backoff before the second publication attempt; doubles per attempt.
    pub publish_initial_backoff: Duration,

    /// Upper bound on the publication backoff.
    pub publish_max_backoff: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            result_ttl: Duration::from_secs(3600),
            handler_timeout: None,
            publish_attempts: 5,
            publish_initial_backoff: Duration::from_millis(100),
            publish_max_backoff: Duration::from_secs(5),
        }
    }
}

/// Handle to a running pool of executors.
///
/// Dropping the pool without calling [`shutdown`](WorkerPool::shutdown)
/// stops the executors at their next loop iteration (the shutdown channel
/// closes); `shutdown` additionally waits for in-flight tasks up to a grace
/// deadline.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    executors: Vec<JoinHandle<()>>,
    metrics: Arc<Metrics>,
}

impl WorkerPool {
    /// Spawns `n` executors against the shared queue and result store.
    ///
    /// The registry is frozen for the pool's lifetime. `metrics` receives
    /// the publish-retry and result-lost counters.
    pub fn spawn(
        n: usize,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn ResultStore>,
        registry: Arc<HandlerRegistry>,
        options: WorkerOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut executors = Vec::with_capacity(n);
        for worker_id in 0..n {
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&store);
            let registry = Arc::clone(&registry);
            let options = options.clone();
            let metrics = Arc::clone(&metrics);
            let shutdown_rx = shutdown_rx.clone();

            executors.push(tokio::spawn(async move {
                executor_loop(
                    worker_id, queue, store, registry, options, metrics, shutdown_rx,
                )
                .await;
            }));
        }

        tracing::info!(executors = n, "worker pool started");
        Self {
            shutdown_tx,
            executors,
            metrics,
        }
    }

    /// The counter set recording publish retries and lost results.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Signals shutdown without waiting.
    ///
    /// Executors finish their current task and exit; nothing new is popped.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signals shutdown and waits for every executor to exit, up to `grace`.
    ///
    /// Executors still running when the grace deadline elapses are detached;
    /// their in-flight results may be lost.
    pub async fn shutdown(mut self, grace: Duration) {
        self.request_shutdown();

        let deadline = Instant::now() + grace;
        for handle in self.executors.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!("executor did not exit within grace deadline; detaching");
                }
            }
        }
    }
}

async fn executor_loop(
    worker_id: usize,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn ResultStore>,
    registry: Arc<HandlerRegistry>,
    options: WorkerOptions,
    metrics: Arc<Metrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // pop blocks up to poll_timeout, so race it against shutdown.
        let popped = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // Pool handle dropped without an explicit shutdown.
                    break;
                }
                continue;
            }
            popped = queue.pop(options.poll_timeout) => popped,
        };

        let task = match popped {
            Ok(Some(task)) => task,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(worker_id, error = %err, "queue pop failed");
                tokio::time::sleep(POP_FAILURE_BACKOFF).await;
                continue;
            }
        };

        let record = execute_task(task, &registry, &options).await;
        publish_with_retry(store.as_ref(), &record, &options, &metrics).await;
    }

    tracing::debug!(worker_id, "executor exited");
}

/// Runs one task to a terminal record. Never fails: unknown kinds, handler
/// errors, deadline overruns, and panics all become `failed` outcomes.
async fn execute_task(
    mut task: Task,
    registry: &Arc<HandlerRegistry>,
    options: &WorkerOptions,
) -> Task {
    task.mark_running();

    let Some(handler) = registry.get(&task.kind) else {
        let kind = task.kind.clone();
        task.fail(format!("no handler for kind {kind}"));
        return task;
    };

    let handler = Arc::clone(handler);
    let payload = task.payload.clone();
    // The handler runs in its own task so a panic unwinds there, not in the
    // executor loop.
    let mut invocation = tokio::spawn(async move { handler.handle(&payload).await });

    let joined = match options.handler_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut invocation).await {
            Ok(joined) => joined,
            Err(_) => {
                invocation.abort();
                task.fail("timeout");
                return task;
            }
        },
        None => (&mut invocation).await,
    };

    match joined {
        Ok(Ok(result)) => task.complete(result),
        Ok(Err(err)) => task.fail(err.to_string()),
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            task.fail(format!("handler panicked: {message}"));
        }
        Err(_) => task.fail("handler aborted"),
    }

    task
}

/// Publishes a terminal record, retrying transport faults with bounded
/// exponential backoff. After the configured attempts the outcome is
/// dropped and counted.
async fn publish_with_retry(
    store: &dyn ResultStore,
    record: &Task,
    options: &WorkerOptions,
    metrics: &Metrics,
) {
    let mut backoff = options.publish_initial_backoff;
    for attempt in 1..=options.publish_attempts {
        match store.put(record, options.result_ttl).await {
            Ok(()) => {
                tracing::debug!(task_id = %record.id, status = %record.status, "result published");
                return;
            }
            Err(err) if err.is_unavailable() && attempt < options.publish_attempts => {
                metrics.record_publish_retry();
                tracing::warn!(
                    task_id = %record.id,
                    attempt,
                    error = %err,
                    "result publish failed; backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(options.publish_max_backoff);
            }
            Err(err) => {
                metrics.record_result_lost();
                tracing::error!(
                    task_id = %record.id,
                    error = %err,
                    "result publish exhausted; task outcome lost"
                );
                return;
            }
        }
    }
}
