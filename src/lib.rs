//! conveyor -- a task-execution service.
//!
//! Clients submit units of work over an HTTP API; a pool of worker
//! executors consumes tasks from a shared FIFO queue, runs the handler
//! registered for each task's kind, and publishes the outcome to a
//! TTL-bound result store from which clients poll for results.
//!
//! # Overview
//!
//! Data flows one way: submission -> queue -> worker -> result store ->
//! retrieval. Both the queue and the result store are capability traits
//! with in-memory and Redis implementations, chosen once at startup from
//! configuration. Delivery is at-most-once: a task popped by a worker that
//! dies before publishing is lost, never re-enqueued.
//!
//! # Module Organization
//!
//! - [`domain`] - The task record, its status state machine, and the
//!   submission specification
//! - [`queue`] - `TaskQueue` trait with memory and Redis backends
//! - [`store`] - `ResultStore` trait with memory (reaper) and Redis (native
//!   TTL) backends
//! - [`submit`] - Submission API: validate, assign identity, enqueue
//! - [`worker`] - Handler registry and the executor pool
//! - [`http`] - Axum router with bearer-key authentication
//! - [`config`] - Layered configuration (env > file > defaults)
//! - [`app`] - Backend selection and deployment wiring
//! - [`metrics`] - Counters for silently dropped work
//! - [`error`] - Error taxonomy
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::{json, Map, Value};
//!
//! use conveyor::app::App;
//! use conveyor::config::Config;
//! use conveyor::worker::{HandlerError, HandlerRegistry, TaskHandler};
//!
//! struct Square;
//!
//! #[async_trait]
//! impl TaskHandler for Square {
//!     async fn handle(&self, payload: &Map<String, Value>) -> Result<Value, HandlerError> {
//!         let x = payload
//!             .get("x")
//!             .and_then(Value::as_i64)
//!             .ok_or_else(|| HandlerError::new("payload field 'x' must be an integer"))?;
//!         Ok(json!(x * x))
//!     }
//! }
//!
//! # async fn example() {
//! let mut registry = HandlerRegistry::new();
//! registry.register("square", Arc::new(Square));
//!
//! let app = App::start(&Config::default(), registry).await.unwrap();
//! let spec = serde_json::from_str(r#"{"kind": "square", "payload": {"x": 7}}"#).unwrap();
//! let id = app.submitter().submit(spec).await.unwrap();
//! // ... poll app.store().get(&id) until the result appears.
//! # }
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod metrics;
pub mod queue;
pub mod store;
pub mod submit;
pub mod worker;

// Re-exports for ergonomic access
pub use app::App;
pub use config::{BackendKind, Config};
pub use domain::{new_task_id, Task, TaskSpec, TaskStatus};
pub use error::{BackendError, ConfigError, SubmitError};
pub use metrics::Metrics;
pub use queue::{MemoryQueue, RedisQueue, TaskQueue};
pub use store::{MemoryResultStore, RedisResultStore, ResultStore};
pub use submit::Submitter;
pub use worker::{HandlerError, HandlerRegistry, TaskHandler, WorkerOptions, WorkerPool};
