//! Deployment wiring: backend selection, worker pool startup, and the
//! assembled service handle.
//!
//! Backends are selected once, at construction, from the [`Config`] -- the
//! capability traits carry no runtime switching. All components share one
//! queue, one result store, and one counter set.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::config::{BackendKind, Config};
use crate::error::{BackendError, ConfigError};
use crate::http::{self, ApiState};
use crate::metrics::Metrics;
use crate::queue::{MemoryQueue, RedisQueue, TaskQueue};
use crate::store::{MemoryResultStore, RedisResultStore, ResultStore};
use crate::submit::Submitter;
use crate::worker::{HandlerRegistry, WorkerOptions, WorkerPool};

/// Builds the queue backend named by the configuration.
///
/// The Redis variant connects eagerly and fails fast when the endpoint is
/// unreachable.
pub async fn build_queue(
    config: &Config,
    metrics: Arc<Metrics>,
) -> Result<Arc<dyn TaskQueue>, BackendError> {
    match config.queue_type {
        BackendKind::Memory => Ok(Arc::new(MemoryQueue::new())),
        BackendKind::Redis => {
            let queue = RedisQueue::connect(&config.redis_url)
                .await?
                .with_key(config.queue_key.clone())
                .with_metrics(metrics);
            Ok(Arc::new(queue))
        }
    }
}

/// Builds the result store backend named by the configuration.
pub async fn build_result_store(config: &Config) -> Result<Arc<dyn ResultStore>, BackendError> {
    match config.result_store_type {
        BackendKind::Memory => Ok(Arc::new(MemoryResultStore::new())),
        BackendKind::Redis => {
            let store = RedisResultStore::connect(config.result_store_redis_url())
                .await?
                .with_prefix(config.result_key_prefix.clone());
            Ok(Arc::new(store))
        }
    }
}

/// A running deployment: queue, result store, worker pool, and submission
/// handle, wired from one [`Config`].
///
/// # Examples
///
/// ```rust,no_run
/// use conveyor::app::App;
/// use conveyor::config::Config;
/// use conveyor::worker::HandlerRegistry;
///
/// # async fn example() {
/// let config = Config::load().unwrap();
/// let registry = HandlerRegistry::new();
/// let app = App::start(&config, registry).await.unwrap();
/// let router = app.router(&config).unwrap();
/// // axum::serve(listener, router) ...
/// # }
/// ```
pub struct App {
    submitter: Submitter,
    store: Arc<dyn ResultStore>,
    pool: WorkerPool,
    metrics: Arc<Metrics>,
}

impl App {
    /// Builds backends from the configuration and starts the worker pool
    /// with the given handler registry.
    pub async fn start(config: &Config, registry: HandlerRegistry) -> Result<Self, BackendError> {
        let metrics = Arc::new(Metrics::new());
        let queue = build_queue(config, Arc::clone(&metrics)).await?;
        let store = build_result_store(config).await?;

        let options = WorkerOptions {
            poll_timeout: config.poll_timeout(),
            result_ttl: config.result_store_ttl(),
            handler_timeout: config.handler_timeout(),
            ..WorkerOptions::default()
        };
        let pool = WorkerPool::spawn(
            config.api_workers,
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::new(registry),
            options,
            Arc::clone(&metrics),
        );

        Ok(Self {
            submitter: Submitter::new(queue),
            store,
            pool,
            metrics,
        })
    }

    /// The submission handle for this deployment.
    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// The result store serving retrieval.
    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// The deployment-wide counter set.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Builds the HTTP router for this deployment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when no API key is configured -- the HTTP
    /// surface refuses to start unauthenticated.
    pub fn router(&self, config: &Config) -> Result<Router, ConfigError> {
        let api_key = config.api_key.clone().ok_or_else(|| ConfigError::Invalid {
            key: "CONVEYOR_API_KEY".to_string(),
            message: "an API key is required for the HTTP surface".to_string(),
        })?;
        Ok(http::router(ApiState {
            submitter: self.submitter.clone(),
            store: Arc::clone(&self.store),
            api_key,
        }))
    }

    /// Shuts the worker pool down, waiting up to `grace` for in-flight
    /// tasks.
    pub async fn shutdown(self, grace: Duration) {
        self.pool.shutdown(grace).await;
    }
}
